pub mod config;
pub mod key;

pub use config::Settings;
pub use key::{ConfigInfo, ConfigKey};
