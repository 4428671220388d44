//! # switchyard-core
//!
//! Core types shared by every switchyard crate. This crate has no framework
//! dependencies and provides the foundation for the HTTP, cache and view layers.
//!
//! ## Modules
//!
//! - [`error`] - The error taxonomy and result alias
//! - [`settings`] - Framework settings and the global fallback instance
//! - [`settings_loader`] - Loading settings from TOML, JSON and the environment
//! - [`logging`] - Tracing-based logging integration
//! - [`i18n`] - Active-language state and the translation catalog

pub mod error;
pub mod i18n;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{SwitchyardError, SwitchyardResult, UnresolvedPath};
pub use settings::{Settings, SETTINGS};
