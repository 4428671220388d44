//! # switchyard-views
//!
//! The request dispatch pipeline and everything that plugs into it.
//!
//! A [`Handler`] is built from [`Settings`](switchyard_core::Settings) and a
//! [`MiddlewareLibrary`]. `load_middleware` turns the configured middleware
//! identifiers into ordered hook lists; `handle` then runs each request
//! through request middleware, resolution, view middleware, the view, error
//! routing and response middleware.
//!
//! ## Modules
//!
//! - [`handler`] - The dispatch pipeline
//! - [`middleware`] - Capability traits, the loader library and builtin middleware
//! - [`decorators`] - Per-view wrappers (`cache_page`, `vary_on_headers`, ...)
//! - [`debug`] - Diagnostic 404 and 500 pages served in debug mode
//! - [`server`] - The axum adapter

pub mod debug;
pub mod decorators;
pub mod handler;
pub mod middleware;
pub mod server;

pub use handler::Handler;
pub use middleware::{Middleware, MiddlewareHooks, MiddlewareLibrary, MiddlewareRegistry};
pub use server::Application;
