//! Site-wide page caching.
//!
//! Two middleware split the work:
//!
//! - [`FetchFromCacheMiddleware`] answers `GET`/`HEAD` requests from the cache
//!   when a stored page exists. It should be listed last, so its request hook
//!   runs after everything else has had a chance to short-circuit.
//! - [`UpdateCacheMiddleware`] stores cacheable responses. It should be
//!   listed first, so its response hook runs after everything else has
//!   touched the response.
//!
//! [`CacheMiddleware`] does both and backs the `cache_page` decorator.
//!
//! A response is cacheable when it is a buffered `200` and its
//! `Cache-Control: max-age` (or the configured default) is non-zero. The
//! stored page is keyed on the request's absolute URI and the values of the
//! headers the response varies on; see [`switchyard_cache::utils`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;

use switchyard_cache::utils::{get_cache_key, get_max_age, learn_cache_key, patch_response_headers};
use switchyard_cache::{create_cache, CacheBackend, CacheValue, CachedResponse};
use switchyard_core::{Settings, SwitchyardError, SwitchyardResult};
use switchyard_http::response::{CallbackFuture, PostRenderCallback};
use switchyard_http::{HttpRequest, HttpResponse};

use super::{Middleware, MiddlewareHooks, ProcessRequest, ProcessResponse};

/// Request marker deciding whether the response phase stores the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateCache(pub bool);

fn mark(request: &mut HttpRequest, update: bool) {
    request.extensions_mut().insert(UpdateCache(update));
}

/// Overrides for a [`CacheMiddleware`], used by `cache_page`.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Page lifetime in seconds.
    pub cache_timeout: Option<u64>,
    /// Prefix separating these pages from other cached pages.
    pub key_prefix: Option<String>,
    /// The cache store alias.
    pub cache_alias: Option<String>,
    /// Skip caching for requests carrying a session cookie.
    pub anonymous_only: Option<bool>,
}

impl CacheOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page lifetime.
    #[must_use]
    pub const fn timeout(mut self, seconds: u64) -> Self {
        self.cache_timeout = Some(seconds);
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Sets the store alias.
    #[must_use]
    pub fn cache_alias(mut self, alias: impl Into<String>) -> Self {
        self.cache_alias = Some(alias.into());
        self
    }

    /// Sets the anonymous-only flag.
    #[must_use]
    pub const fn anonymous_only(mut self, anonymous_only: bool) -> Self {
        self.anonymous_only = Some(anonymous_only);
        self
    }
}

/// Values shared by both halves of the page cache.
#[derive(Clone)]
struct CacheConfig {
    cache: Arc<dyn CacheBackend>,
    cache_alias: String,
    cache_timeout: u64,
    key_prefix: String,
    anonymous_only: bool,
    use_etags: bool,
    use_i18n: bool,
    session_cookie_name: String,
}

impl CacheConfig {
    fn new(settings: &Settings, options: &CacheOptions) -> SwitchyardResult<Self> {
        let cache_alias = options
            .cache_alias
            .clone()
            .unwrap_or_else(|| settings.cache_middleware_alias.clone());
        let mut store = settings.caches.get(&cache_alias).cloned().ok_or_else(|| {
            SwitchyardError::ImproperlyConfigured(format!(
                "Could not find config for '{cache_alias}' in the caches setting"
            ))
        })?;
        let key_prefix = options
            .key_prefix
            .clone()
            .unwrap_or_else(|| settings.cache_middleware_key_prefix.clone());
        let cache_timeout = options.cache_timeout.unwrap_or(settings.cache_middleware_seconds);
        if options.key_prefix.is_some() {
            store.key_prefix.clone_from(&key_prefix);
        }
        if options.cache_timeout.is_some() {
            store.timeout = cache_timeout;
        }
        Ok(Self {
            cache: create_cache(&store)?,
            cache_alias,
            cache_timeout,
            key_prefix,
            anonymous_only: options
                .anonymous_only
                .unwrap_or(settings.cache_middleware_anonymous_only),
            use_etags: settings.use_etags,
            use_i18n: settings.use_i18n,
            session_cookie_name: settings.session_cookie_name.clone(),
        })
    }
}

/// Stores cacheable responses.
#[derive(Clone)]
pub struct UpdateCacheMiddleware {
    config: CacheConfig,
}

impl std::fmt::Debug for UpdateCacheMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCacheMiddleware")
            .field("cache_alias", &self.config.cache_alias)
            .field("cache_timeout", &self.config.cache_timeout)
            .field("key_prefix", &self.config.key_prefix)
            .finish_non_exhaustive()
    }
}

impl UpdateCacheMiddleware {
    /// Builds the middleware from the `cache_middleware_*` settings.
    pub fn from_settings(settings: &Settings) -> SwitchyardResult<Self> {
        Ok(Self {
            config: CacheConfig::new(settings, &CacheOptions::default())?,
        })
    }

    fn should_update_cache(&self, request: &HttpRequest) -> bool {
        if !request
            .extensions()
            .get::<UpdateCache>()
            .is_some_and(|marker| marker.0)
        {
            return false;
        }
        !(self.config.anonymous_only && request.cookie(&self.config.session_cookie_name).is_some())
    }
}

#[async_trait]
impl ProcessResponse for UpdateCacheMiddleware {
    async fn process_response(&self, request: &HttpRequest, mut response: HttpResponse) -> SwitchyardResult<HttpResponse> {
        if !self.should_update_cache(request) {
            return Ok(response);
        }
        if response.is_streaming() || response.status() != http::StatusCode::OK {
            return Ok(response);
        }
        let timeout = get_max_age(&response).unwrap_or(self.config.cache_timeout);
        if timeout == 0 {
            return Ok(response);
        }
        patch_response_headers(&mut response, timeout, self.config.use_etags)?;

        let config = &self.config;
        let vary = response.get_header("Vary").map(str::to_string);
        let cache_key = learn_cache_key(
            request,
            vary.as_deref(),
            timeout,
            &config.key_prefix,
            config.cache.as_ref(),
            config.use_i18n,
        )
        .await?;
        let ttl = Some(Duration::from_secs(timeout));

        if response.needs_render() {
            let cache = Arc::clone(&config.cache);
            let callback: PostRenderCallback = Box::new(move |rendered: &HttpResponse| -> CallbackFuture {
                let snapshot = CachedResponse::from_response(rendered);
                Box::pin(async move {
                    cache
                        .set(&cache_key, CacheValue::Response(Arc::new(snapshot)), ttl)
                        .await
                })
            });
            response.add_post_render_callback(callback).await?;
        } else {
            let snapshot = CachedResponse::from_response(&response);
            config
                .cache
                .set(&cache_key, CacheValue::Response(Arc::new(snapshot)), ttl)
                .await?;
            tracing::debug!(path = request.path(), timeout, "Stored page in cache");
        }
        Ok(response)
    }
}

impl Middleware for UpdateCacheMiddleware {
    fn hooks(self: Arc<Self>) -> MiddlewareHooks {
        MiddlewareHooks::new().response(self)
    }
}

/// Answers `GET` and `HEAD` requests from the page cache.
#[derive(Clone)]
pub struct FetchFromCacheMiddleware {
    config: CacheConfig,
}

impl std::fmt::Debug for FetchFromCacheMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchFromCacheMiddleware")
            .field("cache_alias", &self.config.cache_alias)
            .field("key_prefix", &self.config.key_prefix)
            .finish_non_exhaustive()
    }
}

impl FetchFromCacheMiddleware {
    /// Builds the middleware from the `cache_middleware_*` settings.
    pub fn from_settings(settings: &Settings) -> SwitchyardResult<Self> {
        Ok(Self {
            config: CacheConfig::new(settings, &CacheOptions::default())?,
        })
    }

    async fn lookup(&self, request: &HttpRequest, method: &str) -> SwitchyardResult<Option<Arc<CachedResponse>>> {
        let config = &self.config;
        let Some(cache_key) =
            get_cache_key(request, &config.key_prefix, method, config.cache.as_ref(), config.use_i18n).await?
        else {
            return Ok(None);
        };
        Ok(config
            .cache
            .get(&cache_key)
            .await?
            .and_then(|value| value.as_response().cloned()))
    }
}

#[async_trait]
impl ProcessRequest for FetchFromCacheMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> SwitchyardResult<Option<HttpResponse>> {
        let method = request.method().clone();
        if method != Method::GET && method != Method::HEAD {
            mark(request, false);
            return Ok(None);
        }

        let mut cached = self.lookup(request, "GET").await?;
        if cached.is_none() && method == Method::HEAD {
            cached = self.lookup(request, "HEAD").await?;
        }

        match cached {
            Some(snapshot) => {
                tracing::debug!(path = request.path(), "Page cache hit");
                mark(request, false);
                Ok(Some(snapshot.to_response()))
            }
            None => {
                tracing::debug!(path = request.path(), "Page cache miss");
                mark(request, true);
                Ok(None)
            }
        }
    }
}

impl Middleware for FetchFromCacheMiddleware {
    fn hooks(self: Arc<Self>) -> MiddlewareHooks {
        MiddlewareHooks::new().request(self)
    }
}

/// Fetch and update in one middleware.
#[derive(Debug, Clone)]
pub struct CacheMiddleware {
    fetch: FetchFromCacheMiddleware,
    update: UpdateCacheMiddleware,
}

impl CacheMiddleware {
    /// Builds the middleware from the `cache_middleware_*` settings.
    pub fn from_settings(settings: &Settings) -> SwitchyardResult<Self> {
        Self::with_options(settings, &CacheOptions::default())
    }

    /// Builds the middleware with per-view overrides.
    ///
    /// An explicit `key_prefix` or `cache_timeout` is applied to the store
    /// itself as well as to the page keys.
    pub fn with_options(settings: &Settings, options: &CacheOptions) -> SwitchyardResult<Self> {
        let config = CacheConfig::new(settings, options)?;
        Ok(Self {
            fetch: FetchFromCacheMiddleware { config: config.clone() },
            update: UpdateCacheMiddleware { config },
        })
    }

    /// The page lifetime used when a response sets no `max-age`.
    pub const fn cache_timeout(&self) -> u64 {
        self.update.config.cache_timeout
    }

    /// The page key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.update.config.key_prefix
    }

    /// The store alias.
    pub fn cache_alias(&self) -> &str {
        &self.update.config.cache_alias
    }

    /// Whether requests with a session cookie bypass the cache.
    pub const fn anonymous_only(&self) -> bool {
        self.update.config.anonymous_only
    }
}

#[async_trait]
impl ProcessRequest for CacheMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> SwitchyardResult<Option<HttpResponse>> {
        self.fetch.process_request(request).await
    }
}

#[async_trait]
impl ProcessResponse for CacheMiddleware {
    async fn process_response(&self, request: &HttpRequest, response: HttpResponse) -> SwitchyardResult<HttpResponse> {
        self.update.process_response(request, response).await
    }
}

impl Middleware for CacheMiddleware {
    fn hooks(self: Arc<Self>) -> MiddlewareHooks {
        MiddlewareHooks::new()
            .request(Arc::clone(&self) as Arc<dyn ProcessRequest>)
            .response(self)
    }
}
