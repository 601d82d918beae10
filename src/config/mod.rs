//! Configuration
//!
//! A JSON file with one section per concern. Every field has a default, so
//! a missing file or a partial one is valid.

mod schema;
mod store;

pub use schema::*;
pub use store::ConfigStore;

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bt-gamepad/config.json";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "BT_GAMEPAD_CONFIG";
