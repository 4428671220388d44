//! # switchyard
//!
//! Request dispatch core for Rust web applications.
//!
//! This is the meta-crate that re-exports the member crates. Depend on
//! `switchyard` to get everything, or on individual crates for finer-grained
//! control.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use switchyard::core::{logging, Settings};
//! use switchyard::http::urls::{register_urlconf, url, UrlConf};
//! use switchyard::http::{HttpResponse, View};
//! use switchyard::views::{Application, MiddlewareLibrary};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::default();
//! logging::setup_logging(&settings);
//!
//! let index = View::new("site.index", |_req| async { Ok(HttpResponse::ok("index")) });
//! register_urlconf("site.urls", UrlConf::new(vec![url("^$", index, Some("index"))?]));
//!
//! let settings = Settings {
//!     root_urlconf: "site.urls".to_string(),
//!     ..settings
//! };
//! Application::new(Arc::new(settings), MiddlewareLibrary::builtin())?
//!     .run("127.0.0.1:8000")
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Settings, error taxonomy, logging setup and language activation.
pub use switchyard_core as core;

/// Request and response values, URL resolution and reverse lookup.
#[cfg(feature = "http")]
pub use switchyard_http as http;

/// Cache stores and page-cache utilities.
#[cfg(feature = "cache")]
pub use switchyard_cache as cache;

/// The dispatch pipeline, middleware and view decorators.
#[cfg(feature = "views")]
pub use switchyard_views as views;

/// Request lifecycle signals.
#[cfg(feature = "signals")]
pub use switchyard_signals as signals;

pub use async_trait::async_trait;
pub use axum;
pub use tokio;
pub use tracing;
