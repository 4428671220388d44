//! URL configurations and the helpers that build their entries.
//!
//! ```
//! use switchyard_http::urls::conf::{include, url, UrlConf};
//! use switchyard_http::{HttpResponse, View};
//!
//! let index = View::new("blog.index", |_req| async { Ok(HttpResponse::ok("index")) });
//! let blog = UrlConf::new(vec![url("^$", index, Some("index")).unwrap()]);
//! let root = UrlConf::new(vec![include("^blog/", blog, Some("blog"), None).unwrap()]);
//! assert_eq!(root.patterns().len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use switchyard_core::{SwitchyardError, SwitchyardResult, SETTINGS};

use super::locale::PatternSource;
use super::pattern::{Callback, URLPattern};
use super::registry;
use super::resolver::{ErrorKind, URLEntry, URLResolver};

/// An ordered list of URL entries plus optional error-view overrides.
#[derive(Debug, Default)]
pub struct UrlConf {
    patterns: Vec<URLEntry>,
    handlers: HashMap<ErrorKind, Callback>,
}

impl UrlConf {
    /// A configuration over `patterns` using the default error views.
    pub fn new(patterns: Vec<URLEntry>) -> Self {
        Self {
            patterns,
            handlers: HashMap::new(),
        }
    }

    /// Overrides the error view for `kind`.
    #[must_use]
    pub fn with_handler(mut self, kind: ErrorKind, view: impl Into<Callback>) -> Self {
        self.handlers.insert(kind, view.into());
        self
    }

    /// The entries, in declared order.
    pub fn patterns(&self) -> &[URLEntry] {
        &self.patterns
    }

    /// The configured error view for `kind`, if any.
    pub fn handler(&self, kind: ErrorKind) -> Option<&Callback> {
        self.handlers.get(&kind)
    }
}

/// Where a resolver gets its entries from.
#[derive(Debug, Clone)]
pub enum UrlConfSource {
    /// An in-memory configuration.
    Inline(Arc<UrlConf>),
    /// A configuration registered under this name with
    /// [`register_urlconf`](super::registry::register_urlconf).
    Module(String),
}

impl From<UrlConf> for UrlConfSource {
    fn from(conf: UrlConf) -> Self {
        Self::Inline(Arc::new(conf))
    }
}

impl From<Arc<UrlConf>> for UrlConfSource {
    fn from(conf: Arc<UrlConf>) -> Self {
        Self::Inline(conf)
    }
}

impl From<Vec<URLEntry>> for UrlConfSource {
    fn from(patterns: Vec<URLEntry>) -> Self {
        Self::Inline(Arc::new(UrlConf::new(patterns)))
    }
}

/// A leaf entry mapping `regex` to `view`.
///
/// # Errors
///
/// Returns [`SwitchyardError::ImproperlyConfigured`] for an invalid regex or
/// an empty dotted view path.
pub fn url(
    regex: impl Into<PatternSource>,
    view: impl Into<Callback>,
    name: Option<&str>,
) -> SwitchyardResult<URLEntry> {
    url_with(regex, view, HashMap::new(), name)
}

/// Like [`url`], passing `kwargs` to the view on every match.
///
/// # Errors
///
/// As [`url`].
pub fn url_with(
    regex: impl Into<PatternSource>,
    view: impl Into<Callback>,
    kwargs: HashMap<String, String>,
    name: Option<&str>,
) -> SwitchyardResult<URLEntry> {
    URLPattern::new(regex.into(), view.into(), kwargs, name).map(URLEntry::Pattern)
}

fn check_not_locale_prefixed(patterns: &[URLEntry]) -> SwitchyardResult<()> {
    let nested = patterns
        .iter()
        .any(|entry| matches!(entry, URLEntry::Resolver(r) if r.is_locale_prefixed()));
    if nested {
        return Err(SwitchyardError::ImproperlyConfigured(
            "Using i18n_patterns in an included URLconf is not allowed.".to_string(),
        ));
    }
    Ok(())
}

/// A nested resolver matching `regex` and dispatching to `conf`.
///
/// # Errors
///
/// Returns [`SwitchyardError::ImproperlyConfigured`] for an invalid regex or
/// when `conf` itself contains locale-prefixed patterns.
pub fn include(
    regex: impl Into<PatternSource>,
    conf: impl Into<UrlConfSource>,
    namespace: Option<&str>,
    app_name: Option<&str>,
) -> SwitchyardResult<URLEntry> {
    include_with(regex, conf, HashMap::new(), namespace, app_name)
}

/// Like [`include`], adding `kwargs` to every match below it.
///
/// # Errors
///
/// As [`include`].
pub fn include_with(
    regex: impl Into<PatternSource>,
    conf: impl Into<UrlConfSource>,
    kwargs: HashMap<String, String>,
    namespace: Option<&str>,
    app_name: Option<&str>,
) -> SwitchyardResult<URLEntry> {
    let conf = conf.into();
    match &conf {
        UrlConfSource::Inline(inline) => check_not_locale_prefixed(inline.patterns())?,
        UrlConfSource::Module(name) => {
            if let Ok(registered) = registry::load_urlconf(name) {
                check_not_locale_prefixed(registered.patterns())?;
            }
        }
    }
    let resolver = URLResolver::new(regex.into(), conf, kwargs, namespace, app_name)?;
    Ok(URLEntry::Resolver(Arc::new(resolver)))
}

/// Includes the configuration registered as `module`.
///
/// # Errors
///
/// As [`include`].
pub fn include_module(
    regex: impl Into<PatternSource>,
    module: &str,
    namespace: Option<&str>,
    app_name: Option<&str>,
) -> SwitchyardResult<URLEntry> {
    include(regex, UrlConfSource::Module(module.to_string()), namespace, app_name)
}

/// Prefixes every dotted-path callback in `entries` with `prefix`.
///
/// ```
/// use switchyard_http::urls::conf::{patterns, url};
/// use switchyard_http::urls::URLEntry;
///
/// let entries = patterns("blog.views", vec![url("^$", "index", None).unwrap()]);
/// let URLEntry::Pattern(p) = &entries[0] else { unreachable!() };
/// assert_eq!(p.callback().dotted_path(), Some("blog.views.index"));
/// ```
pub fn patterns(prefix: &str, mut entries: Vec<URLEntry>) -> Vec<URLEntry> {
    for entry in &mut entries {
        if let URLEntry::Pattern(pattern) = entry {
            pattern.add_prefix(prefix);
        }
    }
    entries
}

/// Wraps `entries` in a resolver whose prefix is the active language code.
///
/// When the configured settings disable internationalization the entries
/// are returned unwrapped.
///
/// # Errors
///
/// Never fails in practice; the prefix regex is always valid.
pub fn i18n_patterns(prefix: &str, entries: Vec<URLEntry>) -> SwitchyardResult<Vec<URLEntry>> {
    let entries = patterns(prefix, entries);
    let use_i18n = SETTINGS.try_get().map_or(true, |settings| settings.use_i18n);
    if !use_i18n {
        return Ok(entries);
    }
    let resolver = URLResolver::new(
        PatternSource::LanguagePrefix,
        entries.into(),
        HashMap::new(),
        None,
        None,
    )?;
    Ok(vec![URLEntry::Resolver(Arc::new(resolver))])
}
