//! Sixtyfive core library: domain types, registry operators, settings, errors.
//!
//! - [`types`]: newtypes and the registry document
//! - [`registry`]: lookup / add / remove / timestamp bookkeeping, JSON codec
//! - [`expand`]: save-path placeholder expansion
//! - [`settings`]: local per-machine settings
//! - [`error`]: [`CoreError`]

pub mod error;
pub mod expand;
pub mod registry;
pub mod settings;
pub mod types;

pub use error::CoreError;
pub use expand::PathExpander;
pub use registry::archive_object_name;
pub use settings::Settings;
pub use types::{AppConfig, AppName, Config, HostId};
