//! Storage backends and the scheme registry.
//!
//! A connection string looks like `scheme://rest`. The registry maps the
//! scheme to a factory; the backend receives `rest` in
//! [`Backend::initialize`]. Every backend honors the same path semantics:
//! paths are normalized against the session [`Root`] before they reach
//! storage.

pub mod db;
pub mod file;
pub mod keyfile;

use std::collections::BTreeMap;

use crate::error::{ConfiError, Result};
use crate::path::Root;
use crate::tree::KeyTree;
use crate::types::{ConfigInfo, ConfigKey, Settings};

pub use db::DbBackend;
pub use file::FileBackend;


/// The capability contract every storage backend implements.
pub trait Backend {
    /// Registered scheme name (`db`, `file`).
    fn scheme(&self) -> &'static str;

    /// Parse backend-specific connection parameters and open storage.
    fn initialize(&mut self, cnc_string: &str) -> Result<()>;

    /// Bind to the configuration named at initialize time.
    fn select_config(&mut self, create: bool) -> Result<ConfigInfo>;

    /// Name and description of the selected configuration.
    fn current_config(&self) -> Result<ConfigInfo>;

    /// Configurations visible through this backend, filtered with SQL
    /// LIKE semantics. Empty when none match.
    fn configs_list(&self, filter: Option<&str>) -> Result<Vec<ConfigInfo>>;

    fn add_config(&mut self, _name: &str, _description: &str) -> Result<ConfigInfo> {
        Err(self.unsupported("add_config"))
    }

    fn set_config(&mut self, _name: &str, _description: &str) -> Result<()> {
        Err(self.unsupported("set_config"))
    }

    fn path_get_value(&self, path: &str) -> Result<String>;

    /// Overwrite the value of an existing key. Never creates keys.
    fn path_set_value(&mut self, path: &str, value: &str) -> Result<()>;

    /// Materialize the whole configuration.
    fn tree(&self) -> Result<KeyTree>;

    /// Create `key` beneath `parent` (or directly beneath the root) and
    /// assign `value` through [`Backend::path_set_value`].
    fn add_key(&mut self, parent: Option<&str>, key: &str, value: &str) -> Result<ConfigKey>;

    /// Overwrite name, value and description of an existing key.
    fn key_set_key(&mut self, key: &ConfigKey) -> Result<()>;

    fn path_get_key(&self, path: &str) -> Result<ConfigKey>;

    /// Delete the key at `path` and every descendant.
    fn remove_path(&mut self, path: &str) -> Result<()>;

    /// Re-parent the key at `path` beneath `parent`.
    fn path_move(&mut self, _path: &str, _parent: &str) -> Result<()> {
        Err(self.unsupported("path_move"))
    }

    /// Delete every key of the configuration, then the configuration.
    fn remove_config(&mut self) -> Result<()>;

    /// Release storage. Later calls report `NotInitialized`.
    fn close(&mut self) -> Result<()>;

    fn root(&self) -> &Root;

    fn set_root(&mut self, root: Option<&str>);

    fn unsupported(&self, operation: &'static str) -> ConfiError {
        ConfiError::Unsupported {
            backend: self.scheme(),
            operation,
        }
    }
}


/// Builds an uninitialized backend.
pub type Factory = fn(&Settings) -> Box<dyn Backend>;


/// Scheme name → backend factory.
#[derive(Clone)]
pub struct Registry {
    factories: BTreeMap<String, Factory>,
}

impl Registry {
    /// A registry with no backends.
    pub fn empty() -> Self {
        Registry {
            factories: BTreeMap::new(),
        }
    }

    /// The `db` and `file` backends.
    pub fn builtin() -> Self {
        let mut registry = Registry::empty();
        registry.register(db::SCHEME, db_factory);
        registry.register(file::SCHEME, file_factory);
        registry
    }

    /// Add or replace a scheme.
    pub fn register(&mut self, scheme: &str, factory: Factory) {
        self.factories.insert(scheme.to_string(), factory);
    }

    pub fn schemes(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Split `scheme://rest` and build the matching backend. Returns the
    /// uninitialized backend and `rest`.
    pub fn create<'a>(
        &self,
        cnc_string: &'a str,
        settings: &Settings,
    ) -> Result<(Box<dyn Backend>, &'a str)> {
        for (scheme, factory) in &self.factories {
            let prefix = format!("{}://", scheme);
            if let Some(rest) = cnc_string.strip_prefix(prefix.as_str()) {
                return Ok((factory(settings), rest));
            }
        }
        Err(ConfiError::UnknownScheme(cnc_string.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .finish()
    }
}


fn db_factory(settings: &Settings) -> Box<dyn Backend> {
    Box::new(DbBackend::new(settings))
}

fn file_factory(settings: &Settings) -> Box<dyn Backend> {
    Box::new(FileBackend::new(settings))
}


/// SQL LIKE matching (`%` any run, `_` any single char). ASCII letters
/// compare case-insensitively, as in SQLite.
pub(crate) fn like_matches(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    like_at(&p, &t)
}

fn like_at(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('%') => (0..=t.len()).any(|skip| like_at(&p[1..], &t[skip..])),
        Some('_') => !t.is_empty() && like_at(&p[1..], &t[1..]),
        Some(c) => {
            t.first().map_or(false, |f| f.eq_ignore_ascii_case(c)) && like_at(&p[1..], &t[1..])
        }
    }
}


/// A filter only applies when it has non-blank content.
pub(crate) fn effective_filter(filter: Option<&str>) -> Option<&str> {
    filter.filter(|f| !f.trim().is_empty())
}
