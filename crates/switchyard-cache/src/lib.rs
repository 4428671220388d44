//! # switchyard-cache
//!
//! Cache stores and the helpers the page cache is built from.
//!
//! ## Modules
//!
//! - [`backend`] - The [`CacheBackend`] store interface, the in-memory and
//!   dummy stores, and alias lookup through [`get_cache`]
//! - [`response`] - [`CachedResponse`], the snapshot stored for a page
//! - [`utils`] - `Cache-Control`/`Vary` patching and page cache keys

pub mod backend;
pub mod response;
pub mod utils;

pub use backend::{
    create_cache, get_cache, CacheBackend, CacheValue, DummyCache, InMemoryCache, DEFAULT_CACHE_ALIAS,
};
pub use response::CachedResponse;
