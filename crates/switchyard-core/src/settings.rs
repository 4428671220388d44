//! Settings for the switchyard dispatch core.
//!
//! This module provides the [`Settings`] struct, which holds every value the
//! resolver, pipeline and builtin middleware read, and [`LazySettings`], a
//! globally-accessible, lazily-initialized instance used as a fallback by
//! free functions that run outside a request.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Cache store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// The cache backend (e.g. `switchyard.cache.backends.locmem`).
    pub backend: String,
    /// The cache location; locmem stores with the same location share data.
    pub location: String,
    /// Default entry lifetime in seconds.
    pub timeout: u64,
    /// Prefix prepended to every key by the store.
    pub key_prefix: String,
    /// Key version, part of every stored key.
    pub version: u32,
    /// Maximum number of entries before the store culls.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: "switchyard.cache.backends.locmem".to_string(),
            location: String::new(),
            timeout: 300,
            key_prefix: String::new(),
            version: 1,
            max_entries: 300,
        }
    }
}

/// The complete set of framework settings.
///
/// # Examples
///
/// ```
/// use switchyard_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.language_code, "en-us");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether diagnostic error pages are rendered.
    pub debug: bool,
    /// Re-raise uncaught failures instead of rendering a 500 response.
    pub debug_propagate_exceptions: bool,
    /// Name of the root URL configuration.
    pub root_urlconf: String,
    /// Script prefix override; when unset the request's script name is used.
    pub force_script_name: Option<String>,

    // ── Middleware ────────────────────────────────────────────────────

    /// Ordered list of middleware identifiers.
    pub middleware: Vec<String>,

    // ── Common middleware ─────────────────────────────────────────────

    /// Redirect to the slash-terminated path when the original doesn't resolve.
    pub append_slash: bool,
    /// Redirect bare hosts to their `www.` variant.
    pub prepend_www: bool,
    /// Regular expressions for user agents that receive a 403.
    pub disallowed_user_agents: Vec<String>,
    /// Generate ETags from response content.
    pub use_etags: bool,
    /// Charset added to the default content type.
    pub default_charset: String,
    /// Content type used by responses that don't set one.
    pub default_content_type: String,

    // ── Cache middleware ─────────────────────────────────────────────

    /// Cache store configurations, keyed by alias (e.g. "default").
    pub caches: HashMap<String, CacheSettings>,
    /// Alias of the store used by the cache middleware.
    pub cache_middleware_alias: String,
    /// Default lifetime of cached pages, in seconds.
    pub cache_middleware_seconds: u64,
    /// Prefix for page cache keys.
    pub cache_middleware_key_prefix: String,
    /// Only cache requests that carry no session cookie.
    pub cache_middleware_anonymous_only: bool,

    // ── CSRF ─────────────────────────────────────────────────────────

    /// The name of the CSRF cookie.
    pub csrf_cookie_name: String,
    /// CSRF cookie lifetime in seconds.
    pub csrf_cookie_age: u64,
    /// CSRF cookie domain.
    pub csrf_cookie_domain: Option<String>,
    /// CSRF cookie path.
    pub csrf_cookie_path: String,
    /// Whether the CSRF cookie is marked `Secure`.
    pub csrf_cookie_secure: bool,
    /// Whether the CSRF cookie is marked `HttpOnly`.
    pub csrf_cookie_httponly: bool,
    /// Name of the session cookie consulted by anonymous-only caching.
    pub session_cookie_name: String,

    // ── Clickjacking ─────────────────────────────────────────────────

    /// Value of the `X-Frame-Options` header (`SAMEORIGIN` or `DENY`).
    pub x_frame_options: String,

    // ── Internationalization ─────────────────────────────────────────

    /// The default language code (e.g. "en-us").
    pub language_code: String,
    /// Whether internationalization is on: `i18n_patterns` prefixes URLs
    /// with the language code and cache keys carry the active language.
    pub use_i18n: bool,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut caches = HashMap::new();
        caches.insert("default".to_string(), CacheSettings::default());

        Self {
            // Core
            debug: true,
            debug_propagate_exceptions: false,
            root_urlconf: String::new(),
            force_script_name: None,

            // Middleware
            middleware: vec![
                "switchyard.middleware.common.CommonMiddleware".to_string(),
                "switchyard.middleware.csrf.CsrfViewMiddleware".to_string(),
            ],

            // Common middleware
            append_slash: true,
            prepend_www: false,
            disallowed_user_agents: Vec::new(),
            use_etags: false,
            default_charset: "utf-8".to_string(),
            default_content_type: "text/html".to_string(),

            // Cache middleware
            caches,
            cache_middleware_alias: "default".to_string(),
            cache_middleware_seconds: 600,
            cache_middleware_key_prefix: String::new(),
            cache_middleware_anonymous_only: false,

            // CSRF
            csrf_cookie_name: "csrftoken".to_string(),
            csrf_cookie_age: 60 * 60 * 24 * 7 * 52,
            csrf_cookie_domain: None,
            csrf_cookie_path: "/".to_string(),
            csrf_cookie_secure: false,
            csrf_cookie_httponly: false,
            session_cookie_name: "sessionid".to_string(),

            // Clickjacking
            x_frame_options: "SAMEORIGIN".to_string(),

            // Internationalization
            language_code: "en-us".to_string(),
            use_i18n: true,

            // Logging
            log_level: "info".to_string(),

            // Extra
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    /// Returns the full default `Content-Type` value, charset included.
    pub fn default_content_type_header(&self) -> String {
        format!(
            "{}; charset={}",
            self.default_content_type, self.default_charset
        )
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup. Code running
/// outside a request reads it through [`try_get`](LazySettings::try_get).
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns the configured settings, if any.
    pub fn try_get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
