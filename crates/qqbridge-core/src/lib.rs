pub mod config;
pub mod error;

pub use config::{BridgeConfig, QqConfig};
pub use error::{BridgeError, Result};
