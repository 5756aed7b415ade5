//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! static file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable for the process lifetime)
//!
//! dynamic file (TOML), via a provider
//!     → loader.rs (parse only)
//!     → DynamicConfig snapshot
//!     → watcher.rs (dedupe, build, swap into the runtime)
//! ```
//!
//! # Design Decisions
//! - All static fields have defaults to allow minimal configs
//! - Static validation collects every problem before failing
//! - Dynamic snapshots are never rejected as a whole; broken components are
//!   disabled individually by the builder

pub mod dynamic;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use dynamic::DynamicConfig;
pub use loader::{load_config, load_dynamic_config, ConfigError};
pub use schema::{EntryPointConfig, Protocol, ProxyConfig};
pub use watcher::{ConfigMessage, ConfigurationWatcher};
