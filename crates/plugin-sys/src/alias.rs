//! Wildcard matching of policy patterns against plugin paths.
//!
//! A pattern is an optional list of directory segments followed by a file
//! name that may contain `*`. Directory segments must equal the trailing
//! directory segments of the candidate path, so `csdm/ban` matches
//! `optional/crab/csdm/ban.smx` but `a/b` never matches `a.smx`. The file
//! name part is a greedy glob; the candidate may carry a trailing `.smx`
//! that the pattern does not spell out.

const COMPILED_EXTENSION: &str = ".smx";

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Test whether `pattern` matches the plugin path `path`.
pub fn alias_match(pattern: &str, path: &str) -> bool {
    if pattern.ends_with(is_separator) {
        return false;
    }

    let mut pattern_dirs: Vec<&str> = pattern.split(is_separator).collect();
    let pattern_file = pattern_dirs.pop().unwrap_or_default();
    let mut path_dirs: Vec<&str> = path.split(is_separator).collect();
    let path_file = path_dirs.pop().unwrap_or_default();

    if pattern_dirs.len() > path_dirs.len() {
        return false;
    }
    let skip = path_dirs.len() - pattern_dirs.len();
    if path_dirs[skip..] != pattern_dirs[..] {
        return false;
    }

    if glob(pattern_file.as_bytes(), path_file.as_bytes()) {
        return true;
    }
    match path_file.strip_suffix(COMPILED_EXTENSION) {
        Some(stem) => glob(pattern_file.as_bytes(), stem.as_bytes()),
        None => false,
    }
}

/// Greedy `*` matching with a saved resume point for backtracking.
fn glob(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    // Pattern index just past the last `*`, and where in `text` it resumes.
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some(b'*') => {
                p += 1;
                resume = Some((p, t));
            }
            Some(c) if c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((star_p, star_t)) => {
                    p = star_p;
                    t = star_t + 1;
                    resume = Some((star_p, t));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
