//! # switchyard-http
//!
//! HTTP layer for switchyard: request and response values, URL resolution
//! and reverse lookup.
//!
//! ## Modules
//!
//! - [`request`] - The request value handed to views and middleware
//! - [`response`] - The response model: headers, cookies, streaming and deferred bodies
//! - [`headers`] - Case-insensitive response headers
//! - [`cookies`] - Cookie values, `Set-Cookie` serialization and signing
//! - [`view`] - Named async view handles
//! - [`urls`] - Pattern nodes, the resolver, reverse lookup and the URL registries
//! - [`fixes`] - Normalization passes applied to every outgoing response
//! - [`defaults`] - The library's 403, 404 and 500 views
//! - [`utils`] - IRI quoting, HTTP dates and other header helpers

pub mod cookies;
pub mod defaults;
pub mod fixes;
pub mod headers;
pub mod request;
pub mod response;
pub mod urls;
pub mod utils;
pub mod view;

pub use cookies::Cookie;
pub use headers::ResponseHeaders;
pub use request::HttpRequest;
pub use response::{HttpResponse, Renderer};
pub use view::{BoxFuture, View};
