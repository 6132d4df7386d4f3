use serde::{Deserialize, Serialize};

use crate::path;

/// Name and description of one configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ConfigInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ConfigInfo {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A single node of a configuration tree.
///
/// `path` is the chain of ancestor keys from the top of the configuration
/// (no leading `/`, empty for top-level keys). It never contains the key
/// itself. `id` and `parent_id` are only meaningful for the database
/// backend; the file backend identifies keys by `path` + `key`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigKey {
    pub config_id: i64,
    pub id: i64,
    pub parent_id: i64,
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: String,
}

impl ConfigKey {
    /// The synthetic node every tree hangs from.
    pub fn synthetic_root(config_id: i64) -> Self {
        ConfigKey {
            config_id,
            key: "/".to_string(),
            ..ConfigKey::default()
        }
    }

    /// `path/key`, or just `key` at the top level.
    pub fn full_path(&self) -> String {
        path::join(&self.path, &self.key)
    }
}
