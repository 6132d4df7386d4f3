//! The store handle.
//!
//! `Confi` binds a connection string (`db://...`, `file://...`) to a
//! backend chosen from a [`Registry`] and forwards every operation to it.
//! Once the configuration is removed or the handle closed, every call
//! reports [`ConfiError::NotInitialized`].

use tracing::{debug, warn};

use crate::backend::{Backend, Registry};
use crate::error::{ConfiError, Result};
use crate::path::Root;
use crate::tree::KeyTree;
use crate::types::{ConfigInfo, ConfigKey, Settings};


pub struct Confi {
    backend: Option<Box<dyn Backend>>,
}

impl Confi {
    /// Open `cnc` with default settings and the built-in backends.
    pub fn open(cnc: &str) -> Result<Confi> {
        Confi::open_with(cnc, &Settings::default(), &Registry::builtin())
    }

    pub fn open_with(cnc: &str, settings: &Settings, registry: &Registry) -> Result<Confi> {
        let mut backend = connect(cnc, settings, registry)?;
        let info = backend.select_config(settings.create_missing_config)?;
        backend.set_root(Some(settings.default_root.as_str()));
        debug!(scheme = backend.scheme(), config = %info.name, "store opened");
        Ok(Confi {
            backend: Some(backend),
        })
    }

    /// Configurations reachable through `cnc`, without selecting one.
    pub fn configs_list(cnc: &str, filter: Option<&str>) -> Result<Vec<ConfigInfo>> {
        Confi::configs_list_with(cnc, filter, &Settings::default(), &Registry::builtin())
    }

    pub fn configs_list_with(
        cnc: &str,
        filter: Option<&str>,
        settings: &Settings,
        registry: &Registry,
    ) -> Result<Vec<ConfigInfo>> {
        let mut backend = connect(cnc, settings, registry)?;
        let list = backend.configs_list(filter);
        backend.close()?;
        list
    }

    /// Create a configuration through `cnc` without opening it.
    pub fn add_config(cnc: &str, name: &str, description: &str) -> Result<ConfigInfo> {
        Confi::add_config_with(cnc, name, description, &Settings::default(), &Registry::builtin())
    }

    pub fn add_config_with(
        cnc: &str,
        name: &str,
        description: &str,
        settings: &Settings,
        registry: &Registry,
    ) -> Result<ConfigInfo> {
        let mut backend = connect(cnc, settings, registry)?;
        let info = backend.add_config(name, description);
        backend.close()?;
        info
    }

    fn backend(&self) -> Result<&dyn Backend> {
        self.backend.as_deref().ok_or(ConfiError::NotInitialized)
    }

    fn backend_mut(&mut self) -> Result<&mut (dyn Backend + 'static)> {
        self.backend.as_deref_mut().ok_or(ConfiError::NotInitialized)
    }

    /// Registered name of the active backend.
    pub fn scheme(&self) -> Result<&'static str> {
        Ok(self.backend()?.scheme())
    }

    pub fn current_config(&self) -> Result<ConfigInfo> {
        self.backend()?.current_config()
    }

    /// Rename or re-describe the open configuration.
    pub fn set_config(&mut self, name: &str, description: &str) -> Result<()> {
        self.backend_mut()?.set_config(name, description)
    }

    pub fn root(&self) -> Result<&Root> {
        Ok(self.backend()?.root())
    }

    /// Scope later path operations under `root`. `None` resets to `/`.
    pub fn set_root(&mut self, root: Option<&str>) -> Result<()> {
        self.backend_mut()?.set_root(root);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Result<String> {
        self.backend()?.path_get_value(path)
    }

    pub fn set(&mut self, path: &str, value: &str) -> Result<()> {
        self.backend_mut()?.path_set_value(path, value)
    }

    pub fn tree(&self) -> Result<KeyTree> {
        self.backend()?.tree()
    }

    pub fn add_key(&mut self, parent: Option<&str>, key: &str, value: &str) -> Result<ConfigKey> {
        self.backend_mut()?.add_key(parent, key, value)
    }

    pub fn key_set_key(&mut self, key: &ConfigKey) -> Result<()> {
        self.backend_mut()?.key_set_key(key)
    }

    pub fn get_key(&self, path: &str) -> Result<ConfigKey> {
        self.backend()?.path_get_key(path)
    }

    pub fn remove_path(&mut self, path: &str) -> Result<()> {
        self.backend_mut()?.remove_path(path)
    }

    pub fn move_path(&mut self, path: &str, parent: &str) -> Result<()> {
        self.backend_mut()?.path_move(path, parent)
    }

    /// Delete the configuration with all its keys and release the backend.
    /// The handle stays open when the removal fails.
    pub fn remove(&mut self) -> Result<()> {
        self.backend_mut()?.remove_config()?;
        match self.backend.take() {
            Some(mut backend) => backend.close(),
            None => Ok(()),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self.backend.take() {
            Some(mut backend) => backend.close(),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }
}

impl std::fmt::Debug for Confi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Confi")
            .field("scheme", &self.backend.as_ref().map(|b| b.scheme()))
            .finish()
    }
}


/// Build and initialize the backend for `cnc`.
fn connect(cnc: &str, settings: &Settings, registry: &Registry) -> Result<Box<dyn Backend>> {
    let (mut backend, rest) = match registry.create(cnc, settings) {
        Ok(found) => found,
        Err(e) => {
            warn!(cnc, schemes = ?registry.schemes(), "no backend for connection string");
            return Err(e);
        }
    };
    backend.initialize(rest)?;
    Ok(backend)
}
