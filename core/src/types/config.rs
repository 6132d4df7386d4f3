use serde::{Deserialize, Serialize};

/// Explicit construction-time configuration for opening stores.
///
/// Every field has a default so partial settings files are valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    /// Connection string used when the caller supplies none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_connection: Option<String>,
    /// Root applied to every newly opened handle.
    pub default_root: String,
    /// Configuration selected when the connection string has no `CONFI_NAME`.
    pub default_config_name: String,
    /// Create the selected configuration on open when it does not exist.
    pub create_missing_config: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            version: "0.1.0".into(),
            default_connection: None,
            default_root: "/".into(),
            default_config_name: "Default".into(),
            create_missing_config: true,
        }
    }
}
