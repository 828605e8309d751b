//! Native functions and per-plugin native import tables.
//!
//! Every compiled plugin carries a table of native imports: names it expects
//! the host (or another plugin) to implement. A slot is either unbound or
//! bound to an implementation together with the owner that supplied it.

use crate::error::RuntimeResult;
use crate::identity::IdentityToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// A cell value passed to and returned from functions and natives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// String value.
    Str(String),
}

/// Implementation pointer installed into an import slot.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> RuntimeResult<Value>>;

/// Who supplied a bound native.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOwner {
    /// Implemented by the host process.
    Core,
    /// Exported by the plugin holding this identity.
    Plugin(IdentityToken),
}

/// A resolved binding for an import slot.
#[derive(Clone)]
pub struct NativeBinding {
    pub owner: NativeOwner,
    pub func: NativeFn,
}

impl fmt::Debug for NativeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBinding")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// One native import of a plugin.
#[derive(Debug, Clone)]
pub struct NativeSlot {
    pub name: String,
    pub optional: bool,
    pub binding: Option<NativeBinding>,
}

impl NativeSlot {
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Names starting with `@` are reserved for the runtime itself.
    pub fn is_reserved(&self) -> bool {
        self.name.starts_with('@')
    }
}

/// Ordered native import table of a single plugin.
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    slots: Vec<NativeSlot>,
}

impl NativeTable {
    /// Build a table of unbound slots.
    pub fn new<I, S>(imports: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let slots = imports
            .into_iter()
            .map(|(name, optional)| NativeSlot {
                name: name.into(),
                optional,
                binding: None,
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NativeSlot> {
        self.slots.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NativeSlot> {
        self.slots.get(index)
    }

    /// Index of the slot importing `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Install `binding` into slot `index`. Returns false if the index is out
    /// of range or the slot is already bound.
    pub fn bind(&mut self, index: usize, binding: NativeBinding) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.binding.is_none() => {
                slot.binding = Some(binding);
                true
            }
            _ => false,
        }
    }

    /// Mark an import as optional; missing optional natives never fail a load.
    pub fn mark_optional(&mut self, name: &str) -> bool {
        match self.slots.iter_mut().find(|s| s.name == name) {
            Some(slot) => {
                slot.optional = true;
                true
            }
            None => false,
        }
    }

    /// Names of slots that are unbound, required and not reserved.
    pub fn unresolved(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| !s.is_bound() && !s.optional && !s.is_reserved())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Unbind every slot bound to natives owned by `token`, optional ones
    /// included. Returns the number of slots that were unbound.
    pub fn unbind_owned_by(&mut self, token: IdentityToken) -> usize {
        let mut unbound = 0;
        for slot in &mut self.slots {
            let owned = matches!(
                &slot.binding,
                Some(NativeBinding { owner: NativeOwner::Plugin(t), .. }) if *t == token
            );
            if owned {
                slot.binding = None;
                unbound += 1;
            }
        }
        unbound
    }

    /// Call the native bound to `name`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        let slot = self
            .slots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| crate::RuntimeError::NativeNotBound(name.to_string()))?;
        match &slot.binding {
            Some(binding) => (binding.func)(args),
            None => Err(crate::RuntimeError::NativeNotBound(name.to_string())),
        }
    }
}

/// Wrap a closure as a [`NativeFn`].
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&[Value]) -> RuntimeResult<Value> + 'static,
{
    Rc::new(f)
}
