//! Reverse URL lookup.
//!
//! [`reverse`] turns a pattern name (optionally namespaced, `"ns:inner:name"`)
//! or a [`View`] back into a path. Namespaces are walked from the outermost
//! inward; a label that names an application rather than an instance picks
//! the instance given as `current_app`, or the application's default
//! instance.
//!
//! ```
//! use switchyard_http::urls::conf::{url, UrlConf};
//! use switchyard_http::urls::registry::register_urlconf;
//! use switchyard_http::urls::reverse::{reverse_with, ReverseArgs, ReverseOptions};
//! use switchyard_http::{HttpResponse, View};
//!
//! let year = View::new("archive.year", |_req| async { Ok(HttpResponse::ok("")) });
//! register_urlconf(
//!     "doc.urls",
//!     UrlConf::new(vec![url(r"^archive/(?P<year>\d{4})/$", year, Some("archive-year")).unwrap()]),
//! );
//!
//! let options = ReverseOptions::default().urlconf("doc.urls");
//! let path = reverse_with("archive-year", &ReverseArgs::new().kwarg("year", 2024), &options).unwrap();
//! assert_eq!(path, "/archive/2024/");
//! ```

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use switchyard_core::{SwitchyardError, SwitchyardResult};

use super::context;
use super::registry;
use super::resolver::{LookupKey, URLResolver};
use crate::utils::iri_to_uri;
use crate::view::View;

/// What to reverse: a (possibly namespaced) name or a view.
#[derive(Debug, Clone)]
pub enum ReverseTarget {
    /// A pattern name, dotted view path, or `ns:name`.
    Name(String),
    /// A view value.
    View(View),
}

impl From<&str> for ReverseTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ReverseTarget {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<View> for ReverseTarget {
    fn from(view: View) -> Self {
        Self::View(view)
    }
}

impl From<&View> for ReverseTarget {
    fn from(view: &View) -> Self {
        Self::View(view.clone())
    }
}

/// Positional or keyword arguments for [`reverse`].
#[derive(Debug, Clone, Default)]
pub struct ReverseArgs {
    args: Vec<String>,
    kwargs: HashMap<String, String>,
}

impl ReverseArgs {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Adds a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, key: &str, value: impl Display) -> Self {
        self.kwargs.insert(key.to_string(), value.to_string());
        self
    }

    /// The positional arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The keyword arguments.
    pub const fn kwargs(&self) -> &HashMap<String, String> {
        &self.kwargs
    }
}

/// Where and how to reverse.
#[derive(Debug, Clone, Default)]
pub struct ReverseOptions {
    urlconf: Option<String>,
    prefix: Option<String>,
    current_app: Option<String>,
}

impl ReverseOptions {
    /// Reverse against this URL configuration instead of the current one.
    #[must_use]
    pub fn urlconf(mut self, urlconf: &str) -> Self {
        self.urlconf = Some(urlconf.to_string());
        self
    }

    /// Prefix the result with this instead of the current script prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Prefer this application instance when a namespace names an application.
    #[must_use]
    pub fn current_app(mut self, current_app: &str) -> Self {
        self.current_app = Some(current_app.to_string());
        self
    }
}

/// Reverses `target` against the current URL configuration and script prefix.
///
/// # Errors
///
/// See [`reverse_with`].
pub fn reverse(target: impl Into<ReverseTarget>, args: &ReverseArgs) -> SwitchyardResult<String> {
    reverse_with(target, args, &ReverseOptions::default())
}

/// Reverses `target` with explicit options.
///
/// # Errors
///
/// - [`SwitchyardError::NoReverseMatch`] when a namespace isn't registered or
///   no pattern produces a path for the arguments.
/// - [`SwitchyardError::InvalidArguments`] when both positional and keyword
///   arguments are given.
pub fn reverse_with(
    target: impl Into<ReverseTarget>,
    args: &ReverseArgs,
    options: &ReverseOptions,
) -> SwitchyardResult<String> {
    let mut resolver = registry::get_resolver(options.urlconf.as_deref())?;
    let prefix = options
        .prefix
        .clone()
        .unwrap_or_else(context::get_script_prefix);

    let (key, display) = match target.into() {
        ReverseTarget::View(view) => (LookupKey::View(view.id()), view.name().to_string()),
        ReverseTarget::Name(name) => {
            let mut parts: Vec<&str> = name.split(':').collect();
            let view = parts.pop().unwrap_or_default().to_string();
            if !parts.is_empty() {
                resolver = walk_namespaces(&resolver, &parts, options.current_app.as_deref())?;
            }
            (name_key(&resolver, &view)?, view)
        }
    };

    let path = resolver.reverse_with_prefix(&key, &display, &prefix, args.args(), args.kwargs())?;
    Ok(iri_to_uri(&path))
}

/// A dotted view path that names a registered view reverses through that
/// view; anything else is a pattern name.
fn name_key(resolver: &URLResolver, name: &str) -> SwitchyardResult<LookupKey> {
    if let Some(view) = registry::lookup_view(name) {
        let key = LookupKey::View(view.id());
        if resolver.has_lookup(&key)? {
            return Ok(key);
        }
    }
    Ok(LookupKey::Name(name.to_string()))
}

fn walk_namespaces(
    root: &Arc<URLResolver>,
    path: &[&str],
    current_app: Option<&str>,
) -> SwitchyardResult<Arc<URLResolver>> {
    let mut resolver = Arc::clone(root);
    let mut resolved: Vec<String> = Vec::new();
    let mut ns_pattern = String::new();

    for label in path {
        let mut ns = (*label).to_string();
        let instances = resolver.app_instances(&ns)?;
        if !instances.is_empty() {
            match current_app {
                Some(app) if instances.iter().any(|i| i == app) => ns = app.to_string(),
                _ if !instances.contains(&ns) => ns.clone_from(&instances[0]),
                _ => {}
            }
        }
        let Some((extra, child)) = resolver.namespace_entry(&ns)? else {
            let message = if resolved.is_empty() {
                format!("'{ns}' is not a registered namespace")
            } else {
                format!("'{ns}' is not a registered namespace inside '{}'", resolved.join(":"))
            };
            return Err(SwitchyardError::NoReverseMatch(message));
        };
        resolved.push(ns);
        ns_pattern.push_str(&extra);
        resolver = child;
    }
    registry::get_ns_resolver(&ns_pattern, &resolver)
}
