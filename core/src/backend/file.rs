//! Key-file backend.
//!
//! The connection string is a file path. Paths are exactly two levels deep,
//! `group/key`; the `[CONFI]` group carries the configuration's name and
//! description and is not part of the tree. Its values can be read and set
//! through `CONFI/name` and `CONFI/description`, but keys cannot be added
//! to it or removed from it. Every mutation rewrites the whole file before
//! the in-memory document is replaced.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::keyfile::{self, KeyFile};
use super::{effective_filter, like_matches, Backend};
use crate::error::{ConfiError, Result};
use crate::path::{self, Root};
use crate::tree::{self, ChildSource, KeyTree};
use crate::types::{ConfigInfo, ConfigKey, Settings};

pub const SCHEME: &str = "file";

/// Group holding the configuration metadata.
pub const META_GROUP: &str = "CONFI";


pub struct FileBackend {
    file: Option<PathBuf>,
    doc: KeyFile,
    default_name: String,
    root: Root,
}

impl FileBackend {
    pub fn new(settings: &Settings) -> Self {
        FileBackend {
            file: None,
            doc: KeyFile::new(),
            default_name: settings.default_config_name.clone(),
            root: Root::new(Some(settings.default_root.as_str())),
        }
    }

    fn file(&self) -> Result<&Path> {
        self.file.as_deref().ok_or(ConfiError::NotInitialized)
    }

    /// Normalize `raw` against the root and split it into group and key.
    pub fn group_and_key(&self, raw: &str) -> Result<(String, String)> {
        let abs = self.root.normalize(raw)?;
        split_group_key(&abs)
    }

    /// Apply `change` to a copy of the document, save it, then swap it in.
    fn commit<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut KeyFile),
    {
        let file = self.file()?.to_path_buf();
        let mut next = self.doc.clone();
        change(&mut next);
        if let Err(e) = next.save(&file) {
            warn!(file = %file.display(), error = %e, "cannot save key file");
            return Err(e);
        }
        self.doc = next;
        Ok(())
    }

    fn require_entry(&self, group: &str, key: &str) -> Result<()> {
        self.file()?;
        if self.doc.entry(group, key).is_none() {
            warn!(group, key, "key not found");
            return Err(ConfiError::not_found(format!("/{}/{}", group, key)));
        }
        Ok(())
    }

    fn write_value(&mut self, group: &str, key: &str, value: &str) -> Result<()> {
        self.require_entry(group, key)?;
        self.commit(|doc| assign(doc, group, key, value))
    }

    /// Group a new key goes into: `parent` (or the root) must be one segment.
    fn target_group(&self, parent: Option<&str>) -> Result<String> {
        let scope = match parent.filter(|p| !p.trim().is_empty()) {
            Some(p) => self.root.normalize(p)?,
            None => self.root.as_str().to_string(),
        };
        let group = match path::tokens(&scope).as_slice() {
            [group] => group.to_string(),
            _ => {
                return Err(ConfiError::malformed(format!(
                    "'{}' does not name a group",
                    scope
                )))
            }
        };
        keyfile::check_group_name(&group)?;
        reject_meta(&group)?;
        Ok(group)
    }

    fn key_at(&self, group: &str, key: &str) -> Result<ConfigKey> {
        self.require_entry(group, key)?;
        let entry = self
            .doc
            .entry(group, key)
            .ok_or_else(|| ConfiError::not_found(format!("/{}/{}", group, key)))?;
        Ok(ConfigKey {
            key: entry.key.clone(),
            value: entry.value.clone(),
            description: entry.comment.clone(),
            path: group.to_string(),
            ..ConfigKey::default()
        })
    }
}

impl Backend for FileBackend {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn initialize(&mut self, cnc_string: &str) -> Result<()> {
        let file = cnc_string.trim();
        if file.is_empty() {
            return Err(ConfiError::malformed("empty key file path"));
        }
        let file = PathBuf::from(file);
        self.doc = if file.exists() {
            KeyFile::load(&file)?
        } else {
            debug!(file = %file.display(), "key file missing, starting empty");
            KeyFile::new()
        };
        self.file = Some(file);
        Ok(())
    }

    fn select_config(&mut self, _create: bool) -> Result<ConfigInfo> {
        self.current_config()
    }

    fn current_config(&self) -> Result<ConfigInfo> {
        self.file()?;
        let name = self
            .doc
            .value(META_GROUP, "name")
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(self.default_name.as_str());
        let description = self.doc.value(META_GROUP, "description").unwrap_or("");
        Ok(ConfigInfo::new(name, description))
    }

    fn configs_list(&self, filter: Option<&str>) -> Result<Vec<ConfigInfo>> {
        let current = self.current_config()?;
        match effective_filter(filter) {
            Some(f) if !like_matches(f, &current.name) => Ok(Vec::new()),
            _ => Ok(vec![current]),
        }
    }

    fn path_get_value(&self, path: &str) -> Result<String> {
        let (group, key) = self.group_and_key(path)?;
        self.key_at(&group, &key).map(|k| k.value)
    }

    fn path_set_value(&mut self, path: &str, value: &str) -> Result<()> {
        let (group, key) = self.group_and_key(path)?;
        self.write_value(&group, &key, value)
    }

    fn tree(&self) -> Result<KeyTree> {
        self.file()?;
        tree::materialize(self, ConfigKey::synthetic_root(0), "")
    }

    fn add_key(&mut self, parent: Option<&str>, key: &str, value: &str) -> Result<ConfigKey> {
        let key = path::validate_key_name(key)?.to_string();
        keyfile::check_key_name(&key)?;
        let group = self.target_group(parent)?;

        self.commit(|doc| {
            doc.add_group(&group);
            if doc.entry(&group, &key).is_none() {
                doc.set_value(&group, &key, "");
            }
            assign(doc, &group, &key, value);
        })?;
        self.key_at(&group, &key)
    }

    fn key_set_key(&mut self, key: &ConfigKey) -> Result<()> {
        let group = match path::tokens(&key.path).as_slice() {
            [group] => group.to_string(),
            _ => {
                return Err(ConfiError::malformed(format!(
                    "'{}' does not name a group",
                    key.path
                )))
            }
        };
        let name = path::validate_key_name(&key.key)?;
        self.require_entry(&group, name)?;
        self.commit(|doc| {
            doc.set_value(&group, name, &key.value);
            doc.set_comment(&group, name, &key.description);
        })
    }

    fn path_get_key(&self, path: &str) -> Result<ConfigKey> {
        let (group, key) = self.group_and_key(path)?;
        self.key_at(&group, &key)
    }

    fn remove_path(&mut self, path: &str) -> Result<()> {
        let abs = self.root.normalize(path)?;
        match path::tokens(&abs).as_slice() {
            [group] => {
                let group = group.to_string();
                reject_meta(&group)?;
                self.file()?;
                if self.doc.group(&group).is_none() {
                    warn!(group = %group, "group not found");
                    return Err(ConfiError::not_found(abs.as_str()));
                }
                self.commit(|doc| {
                    doc.remove_group(&group);
                })
            }
            _ => {
                let (group, key) = split_group_key(&abs)?;
                reject_meta(&group)?;
                self.require_entry(&group, &key)?;
                self.commit(|doc| {
                    doc.remove_key(&group, &key);
                })
            }
        }
    }

    fn remove_config(&mut self) -> Result<()> {
        let file = self.file()?.to_path_buf();
        if file.exists() {
            std::fs::remove_file(&file)?;
        }
        info!(file = %file.display(), "key file removed");
        self.doc = KeyFile::new();
        self.file = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        self.doc = KeyFile::new();
        Ok(())
    }

    fn root(&self) -> &Root {
        &self.root
    }

    fn set_root(&mut self, root: Option<&str>) {
        self.root.set(root);
    }
}

impl ChildSource for FileBackend {
    /// Groups at the top, their keys one level down, nothing deeper.
    fn children(&self, _parent: &ConfigKey, chain: &str) -> Result<Vec<ConfigKey>> {
        if chain.is_empty() {
            return Ok(self
                .doc
                .groups()
                .iter()
                .filter(|g| g.name != META_GROUP)
                .map(|g| ConfigKey {
                    key: g.name.clone(),
                    description: g.comment.clone(),
                    ..ConfigKey::default()
                })
                .collect());
        }

        let group = match self.doc.group(chain) {
            Some(g) => g,
            None => return Ok(Vec::new()),
        };
        Ok(group
            .entries
            .iter()
            .map(|e| ConfigKey {
                key: e.key.clone(),
                value: e.value.clone(),
                description: e.comment.clone(),
                path: group.name.clone(),
                ..ConfigKey::default()
            })
            .collect())
    }
}


/// The one place values are written into the document.
fn assign(doc: &mut KeyFile, group: &str, key: &str, value: &str) {
    doc.set_value(group, key, value);
}


fn reject_meta(group: &str) -> Result<()> {
    if group == META_GROUP {
        return Err(ConfiError::malformed(format!(
            "the [{}] group is reserved",
            META_GROUP
        )));
    }
    Ok(())
}


/// Split an absolute `/group/key` path. Exactly one inner separator is
/// allowed once the outer ones are stripped.
pub fn split_group_key(abs: &str) -> Result<(String, String)> {
    let inner = abs.trim_matches('/');
    let (group, key) = inner
        .split_once('/')
        .filter(|(_, key)| !key.contains('/'))
        .ok_or_else(|| {
            ConfiError::malformed(format!("'{}' is not a group/key path", abs))
        })?;
    let (group, key) = (group.trim(), key.trim());
    if group.is_empty() || key.is_empty() {
        return Err(ConfiError::malformed(format!(
            "'{}' is not a group/key path",
            abs
        )));
    }
    Ok((group.to_string(), key.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[CONFI]
name=Sample
description=Sample file

# Connection
[network]
# Host name
host=example.org
port=8080

[paths]
data=/var/lib/app
";

    fn open(dir: &tempfile::TempDir, content: Option<&str>) -> (FileBackend, PathBuf) {
        let file = dir.path().join("app.conf");
        if let Some(text) = content {
            std::fs::write(&file, text).unwrap();
        }
        let mut backend = FileBackend::new(&Settings::default());
        backend.initialize(file.to_str().unwrap()).unwrap();
        backend.select_config(true).unwrap();
        (backend, file)
    }

    #[test]
    fn split_requires_two_segments() {
        assert_eq!(
            split_group_key("/a/b").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert_eq!(
            split_group_key("a/ b ").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert!(split_group_key("/a/b/c").is_err());
        assert!(split_group_key("/a").is_err());
        assert!(split_group_key("/ /b").is_err());
    }

    #[test]
    fn group_and_key_applies_root() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        assert!(backend.group_and_key("a/b").is_ok());
        assert!(backend.group_and_key("a/b/c").is_err());
        assert_eq!(backend.path_get_value("network/port").unwrap(), "8080");

        backend.set_root(Some("network"));
        assert!(backend.path_get_value("network/port").is_err());
        assert_eq!(
            backend.group_and_key("host").unwrap(),
            ("network".to_string(), "host".to_string())
        );
        assert_eq!(backend.path_get_value("port").unwrap(), "8080");
        assert!(backend.group_and_key("a/b").is_err());
    }

    #[test]
    fn reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, _) = open(&dir, Some(SAMPLE));
        assert_eq!(
            backend.current_config().unwrap(),
            ConfigInfo::new("Sample", "Sample file")
        );
        assert_eq!(backend.configs_list(None).unwrap().len(), 1);
        assert_eq!(backend.configs_list(Some("Sam%")).unwrap().len(), 1);
        assert!(backend.configs_list(Some("Other")).unwrap().is_empty());
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, file) = open(&dir, None);
        assert!(!file.exists());
        assert_eq!(backend.current_config().unwrap().name, "Default");
        assert_eq!(backend.tree().unwrap().node_count(), 1);

        backend.add_key(Some("fresh"), "k", "v").unwrap();
        assert!(file.exists());
        let on_disk = KeyFile::load(&file).unwrap();
        assert_eq!(on_disk.value("fresh", "k"), Some("v"));
    }

    #[test]
    fn set_then_get_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, file) = open(&dir, Some(SAMPLE));
        backend.path_set_value("network/port", "9090").unwrap();
        assert_eq!(backend.path_get_value("/network/port").unwrap(), "9090");

        let mut reopened = FileBackend::new(&Settings::default());
        reopened.initialize(file.to_str().unwrap()).unwrap();
        assert_eq!(reopened.path_get_value("network/port").unwrap(), "9090");
        assert_eq!(
            reopened.path_get_key("network/host").unwrap().description,
            "Host name"
        );
    }

    #[test]
    fn set_never_creates() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        assert!(matches!(
            backend.path_set_value("network/missing", "x"),
            Err(ConfiError::NotFound { .. })
        ));
        assert!(backend.path_get_value("network/missing").is_err());
    }

    #[test]
    fn add_key_into_group() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        let k = backend.add_key(Some("network"), "timeout", "30").unwrap();
        assert_eq!(k.path, "network");
        assert_eq!(k.value, "30");
        let got = backend.path_get_key("network/timeout").unwrap();
        assert_eq!(got.key, "timeout");
        assert_eq!(got.value, "30");

        backend.set_root(Some("paths"));
        backend.add_key(None, "cache", "/tmp").unwrap();
        assert_eq!(backend.path_get_value("cache").unwrap(), "/tmp");
    }

    #[test]
    fn add_key_needs_a_group() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        assert!(backend.add_key(None, "loose", "v").is_err());
        assert!(backend.add_key(Some("network/host"), "k", "v").is_err());
        assert!(backend.add_key(Some("network"), "a/b", "v").is_err());
    }

    #[test]
    fn add_key_rejects_names_the_file_cannot_hold() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, file) = open(&dir, Some(SAMPLE));
        for bad in ["[odd", "a=b", "#k", ";k", "new\nline"] {
            let err = backend.add_key(Some("network"), bad, "v").unwrap_err();
            assert!(matches!(err, ConfiError::Malformed(_)), "{:?}", bad);
        }
        assert!(backend.add_key(Some("#group"), "k", "v").is_err());

        backend.add_key(Some("network"), "x[y]", "v").unwrap();
        let mut reopened = FileBackend::new(&Settings::default());
        reopened.initialize(file.to_str().unwrap()).unwrap();
        assert_eq!(reopened.path_get_value("network/x[y]").unwrap(), "v");
        assert_eq!(reopened.tree().unwrap().find("network").unwrap().children.len(), 3);
    }

    #[test]
    fn failed_add_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, file) = open(&dir, Some(SAMPLE));
        std::fs::create_dir(dir.path().join("app.conf.tmp")).unwrap();

        assert!(backend.add_key(Some("network"), "timeout", "30").is_err());
        assert!(backend.path_get_value("network/timeout").is_err());
        assert!(KeyFile::load(&file).unwrap().entry("network", "timeout").is_none());
    }

    #[test]
    fn metadata_group_is_guarded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        assert!(backend.add_key(Some("CONFI"), "extra", "v").is_err());
        assert!(backend.remove_path("CONFI").is_err());
        assert!(backend.remove_path("CONFI/name").is_err());

        assert_eq!(backend.path_get_value("CONFI/name").unwrap(), "Sample");
        backend.path_set_value("CONFI/name", "Renamed").unwrap();
        assert_eq!(backend.current_config().unwrap().name, "Renamed");
    }

    #[test]
    fn duplicate_add_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        backend.add_key(Some("network"), "host", "other.org").unwrap();
        let tree = backend.tree().unwrap();
        let network = tree.find("network").unwrap();
        let hosts = network.children.iter().filter(|c| c.key.key == "host").count();
        assert_eq!(hosts, 1);
        assert_eq!(backend.path_get_value("network/host").unwrap(), "other.org");
    }

    #[test]
    fn tree_hides_metadata_group() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, _) = open(&dir, Some(SAMPLE));
        let tree = backend.tree().unwrap();
        let top: Vec<&str> = tree.root().children.iter().map(|c| c.key.key.as_str()).collect();
        assert_eq!(top, vec!["network", "paths"]);
        assert_eq!(tree.node_count(), 1 + 2 + 3);

        let network = tree.find("network").unwrap();
        assert_eq!(network.key.description, "Connection");
        assert_eq!(network.key.path, "");
        let host = tree.find("network/host").unwrap();
        assert_eq!(host.key.path, "network");
        assert_eq!(host.key.value, "example.org");
        assert_eq!(host.key.description, "Host name");
    }

    #[test]
    fn key_set_key_updates_value_and_comment() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, file) = open(&dir, Some(SAMPLE));
        let mut k = backend.path_get_key("network/port").unwrap();
        k.value = "443".into();
        k.description = "TLS port".into();
        backend.key_set_key(&k).unwrap();

        let text = std::fs::read_to_string(&file).unwrap();
        assert!(text.contains("# TLS port\nport=443\n"));

        k.key = "absent".into();
        assert!(backend.key_set_key(&k).is_err());
    }

    #[test]
    fn remove_key_and_group() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        backend.remove_path("network/port").unwrap();
        assert!(backend.path_get_value("network/port").is_err());
        assert_eq!(backend.path_get_value("network/host").unwrap(), "example.org");

        backend.remove_path("network").unwrap();
        assert!(backend.path_get_value("network/host").is_err());
        assert!(backend.tree().unwrap().find("network").is_none());
        assert!(backend.remove_path("network").is_err());
    }

    #[test]
    fn failed_save_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, file) = open(&dir, Some(SAMPLE));
        // A directory in place of the temp file makes the write fail.
        std::fs::create_dir(dir.path().join("app.conf.tmp")).unwrap();

        assert!(backend.path_set_value("network/port", "1").is_err());
        assert_eq!(backend.path_get_value("network/port").unwrap(), "8080");
        assert_eq!(KeyFile::load(&file).unwrap().value("network", "port"), Some("8080"));
    }

    #[test]
    fn config_management_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, _) = open(&dir, Some(SAMPLE));
        assert!(matches!(
            backend.add_config("x", ""),
            Err(ConfiError::Unsupported { backend: "file", .. })
        ));
        assert!(backend.set_config("x", "").is_err());
        assert!(backend.path_move("network/host", "paths").is_err());
    }

    #[test]
    fn remove_config_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, file) = open(&dir, Some(SAMPLE));
        backend.remove_config().unwrap();
        assert!(!file.exists());
        assert!(matches!(
            backend.path_get_value("network/host"),
            Err(ConfiError::NotInitialized)
        ));
    }

    #[test]
    fn malformed_file_fails_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.conf");
        std::fs::write(&file, "orphan=1\n").unwrap();
        let mut backend = FileBackend::new(&Settings::default());
        let err = backend.initialize(file.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfiError::Malformed(_)));
    }
}
