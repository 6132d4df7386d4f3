use std::path::Path;

use tracing::debug;

use crate::error::{ConfiError, Result};
use crate::types::Settings;


/// Returns sensible defaults for all settings fields.
pub fn default_settings() -> Settings {
    Settings::default()
}


/// Load `Settings` from a YAML file.
pub fn load(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfiError::Settings(format!("cannot read {}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "loading settings");
    parse(&content)
}


/// Load settings from `path` when it exists, defaults otherwise.
pub fn load_or_default(path: &Path) -> Result<Settings> {
    if path.exists() {
        load(path)
    } else {
        Ok(default_settings())
    }
}


/// Save `Settings` to a YAML file.
pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    let content = serialize(settings)?;
    std::fs::write(path, content)
        .map_err(|e| ConfiError::Settings(format!("cannot write {}: {}", path.display(), e)))
}


/// Parse settings from YAML text. Blank text yields the defaults and
/// unknown keys are ignored.
pub fn parse(content: &str) -> Result<Settings> {
    if content.trim().is_empty() {
        return Ok(default_settings());
    }
    serde_yaml::from_str(content).map_err(|e| ConfiError::Settings(e.to_string()))
}


/// Serialize settings to YAML text.
pub fn serialize(settings: &Settings) -> Result<String> {
    serde_yaml::to_string(settings).map_err(|e| ConfiError::Settings(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let s = default_settings();
        assert_eq!(s.default_root, "/");
        assert_eq!(s.default_config_name, "Default");
        assert!(s.create_missing_config);
        assert!(s.default_connection.is_none());
    }

    #[test]
    fn parse_minimal_yaml() {
        let s = parse("default_root: /app\n").unwrap();
        assert_eq!(s.default_root, "/app");
        // Other fields should be defaults
        assert_eq!(s.default_config_name, "Default");
    }

    #[test]
    fn parse_full_yaml() {
        let text = "\
version: \"0.2.0\"
default_connection: \"db://DB_FILE=/var/lib/confi.db;CONFI_NAME=Main\"
default_root: /services/
default_config_name: Main
create_missing_config: false
";
        let s = parse(text).unwrap();
        assert_eq!(s.version, "0.2.0");
        assert_eq!(
            s.default_connection.as_deref(),
            Some("db://DB_FILE=/var/lib/confi.db;CONFI_NAME=Main")
        );
        assert_eq!(s.default_root, "/services/");
        assert_eq!(s.default_config_name, "Main");
        assert!(!s.create_missing_config);
    }

    #[test]
    fn parse_with_comments_and_unknown_keys() {
        let text = "\
# This is a comment
default_config_name: Other
plugins_dir: /usr/lib/confi
";
        let s = parse(text).unwrap();
        assert_eq!(s.default_config_name, "Other");
    }

    #[test]
    fn parse_invalid_bool_fails() {
        let result = parse("create_missing_config: maybe-later\n");
        assert!(matches!(result, Err(ConfiError::Settings(_))));
    }

    #[test]
    fn parse_empty_returns_defaults() {
        assert_eq!(parse("").unwrap(), default_settings());
        assert_eq!(parse("  \n").unwrap(), default_settings());
    }

    #[test]
    fn round_trip_custom() {
        let mut s = default_settings();
        s.default_root = "/custom/".into();
        s.default_connection = Some("file:///tmp/x.conf".into());
        let text = serialize(&s).unwrap();
        assert_eq!(parse(&text).unwrap(), s);
    }

    #[test]
    fn load_nonexistent_file() {
        let result = load(Path::new("/nonexistent/confi/settings.yaml"));
        assert!(result.is_err());
        let fallback = load_or_default(Path::new("/nonexistent/confi/settings.yaml")).unwrap();
        assert_eq!(fallback, default_settings());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");

        let mut s = default_settings();
        s.default_config_name = "Saved".into();
        save(&path, &s).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, s);
    }
}
