//! Configuration manager for a multus-style CNI meta-plugin
//!
//! This crate:
//! - Finds the primary (delegate) CNI plugin configuration in a directory
//! - Checks its CNI version against the meta-plugin's version
//! - Writes the multus shim configuration pointing back at the delegate
//! - Keeps the shim in sync while the delegate changes on disk

pub mod codec;
pub mod config;
pub mod error;
pub mod locator;
pub mod manager;
pub mod types;
pub mod version;
pub mod watcher;

// Re-export commonly used items
pub use config::MultusConfig;
pub use error::ConfigError;
pub use manager::{Lifecycle, Manager};
pub use types::{NetConfDocument, ShimConfig};
