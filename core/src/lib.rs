//! Hierarchical configuration store.
//!
//! Named configurations hold trees of key/value pairs addressed by slash
//! paths, stored in SQLite (`db://`) or in an INI-like key file
//! (`file://`).
//!
//! ```no_run
//! use confi_core::Confi;
//!
//! let mut store = Confi::open("db://DB_FILE=app.db;CONFI_NAME=Main")?;
//! store.add_key(None, "network", "")?;
//! store.add_key(Some("network"), "port", "8080")?;
//! assert_eq!(store.get("network/port")?, "8080");
//! # Ok::<(), confi_core::ConfiError>(())
//! ```

pub mod backend;
pub mod confi;
pub mod error;
pub mod path;
pub mod settings;
pub mod tree;
pub mod types;

pub use backend::{Backend, Registry};
pub use confi::Confi;
pub use error::{ConfiError, ErrorKind, Result};
pub use path::Root;
pub use tree::{KeyNode, KeyTree};
pub use types::{ConfigInfo, ConfigKey, Settings};
