//! dcstat-core: shared domain types and configuration for dcstat.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DcstatConfig, Settings, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
