//! Opaque identity tokens.
//!
//! A token is minted once per plugin when its executable context comes into
//! existence. Other subsystems scope ownership of handles and natives by
//! token; the token itself carries no reference back to the plugin.

use std::fmt;
use uuid::Uuid;

/// Opaque ownership key, comparable only by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityToken(Uuid);

impl IdentityToken {
    /// Mint a fresh token that compares unequal to every other token.
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for log lines.
        let simple = self.0.simple().to_string();
        write!(f, "{}", &simple[..8])
    }
}
