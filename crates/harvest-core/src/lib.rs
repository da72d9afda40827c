//! Harvest Core - Foundation crate for the harvester workspace.
//!
//! This crate provides shared types, error handling, configuration management
//! and the bounded retry counter that the other harvester crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`DocId`, `Timestamp`)
//! - [`counter`] - Bounded, access-expiring attempt counter
//! - [`encoding`] - Form value encoding used on the wire
//!
//! # Example
//!
//! ```rust
//! use harvest_core::{AppConfig, RetryCounter};
//!
//! let config = AppConfig::default();
//! let counter = RetryCounter::new(config.crawl.max_task_retries);
//! assert!(counter.increment_and_check("task").is_allowed());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod counter;
pub mod encoding;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, BrokerConfig, BrowserConfig, CrawlConfig, SiteConfig, StorageConfig};
pub use counter::{Attempt, RetryCounter};
pub use encoding::{decode_value, encode_value};
pub use error::{ConfigError, ConfigResult, HarvestError, Result};
pub use types::{DocId, Timestamp};
