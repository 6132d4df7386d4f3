//! Slash path normalization and root scoping.
//!
//! Paths like `folder/key1/key1_2` are rewritten against the session root
//! (`/` unless changed) into absolute paths such as `/folder/key1/key1_2`,
//! then split into tokens that backends resolve one level at a time.
//! Nothing here touches storage: a normalized path may still name a key
//! that does not exist.

use std::fmt;

use crate::error::{ConfiError, Result};


/// The per-session path prefix. Always starts and ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root(String);

impl Root {
    /// Build a root from raw user input, normalizing it.
    pub fn new(raw: Option<&str>) -> Self {
        Root(normalize_root(raw))
    }

    /// Replace the root. `None` or blank input resets it to `/`.
    pub fn set(&mut self, raw: Option<&str>) {
        self.0 = normalize_root(raw);
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no prefix is applied.
    pub fn is_top(&self) -> bool {
        self.0 == "/"
    }

    /// Tokens of the root itself, e.g. `["folder", "key1"]` for `/folder/key1/`.
    pub fn tokens(&self) -> Vec<&str> {
        tokens(&self.0)
    }

    /// The root as an ancestor chain (`folder/key1`), empty at the top.
    pub fn chain(&self) -> String {
        self.tokens().join("/")
    }

    /// Rewrite `raw` into an absolute path beneath this root.
    pub fn normalize(&self, raw: &str) -> Result<String> {
        normalize(&self.0, raw)
    }
}

impl Default for Root {
    fn default() -> Self {
        Root("/".to_string())
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}


/// Canonical form of a root: blank maps to `/`, otherwise a single leading
/// and trailing `/` are added when missing.
pub fn normalize_root(raw: Option<&str>) -> String {
    let trimmed = match raw {
        Some(r) => r.trim(),
        None => return "/".to_string(),
    };
    if trimmed.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(trimmed.len() + 2);
    if !trimmed.starts_with('/') {
        out.push('/');
    }
    out.push_str(trimmed);
    if !trimmed.ends_with('/') {
        out.push('/');
    }
    out
}


/// Rewrite a raw path into `root + path`.
///
/// Fails when the path is blank or ends with `/`: a path must name a key,
/// never a directory. Every leading `/` is stripped before the root is
/// prepended.
pub fn normalize(root: &str, raw: &str) -> Result<String> {
    let mut rest = raw.trim();
    if rest.is_empty() {
        return Err(ConfiError::malformed("empty path"));
    }
    if rest.ends_with('/') {
        return Err(ConfiError::malformed(format!(
            "path '{}' ends with a separator",
            raw
        )));
    }

    while let Some(stripped) = rest.strip_prefix('/') {
        rest = stripped.trim_start();
    }

    let mut out = String::with_capacity(root.len() + rest.len());
    out.push_str(root);
    out.push_str(rest);
    Ok(out)
}


/// Split a path on `/`, trimming every token and dropping empty ones.
pub fn tokens(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}


/// Join an ancestor chain and a key name. The top level has an empty chain.
pub fn join(chain: &str, key: &str) -> String {
    if chain.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", chain, key)
    }
}


/// Check a single key name: non-blank and free of separators.
pub fn validate_key_name(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfiError::malformed("empty key name"));
    }
    if key.contains('/') {
        return Err(ConfiError::malformed(format!(
            "key name '{}' contains a separator",
            key
        )));
    }
    Ok(key)
}
