//! Process-wide registries: named URL configurations, dotted view paths and
//! the memoized resolvers built from them.
//!
//! Configurations and views are registered at startup. Resolvers are built
//! on first use and kept until [`clear_url_caches`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use switchyard_core::{SwitchyardError, SwitchyardResult, SETTINGS};

use super::conf::{UrlConf, UrlConfSource};
use super::context;
use super::resolver::{ResolverMatch, URLEntry, URLResolver};
use crate::view::View;

static URLCONFS: Lazy<RwLock<HashMap<String, Arc<UrlConf>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static VIEWS: Lazy<RwLock<HashMap<String, View>>> = Lazy::new(|| RwLock::new(HashMap::new()));

static RESOLVERS: Lazy<RwLock<HashMap<String, Arc<URLResolver>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

// Entries keep the namespaced resolver alive so its address stays unique.
type NsResolverCache = HashMap<(String, usize), (Arc<URLResolver>, Arc<URLResolver>)>;

static NS_RESOLVERS: Lazy<RwLock<NsResolverCache>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `conf` under `name`, replacing any previous registration.
///
/// The memoized resolver for `name` and every namespace resolver are
/// dropped so the new configuration takes effect.
pub fn register_urlconf(name: &str, conf: UrlConf) {
    URLCONFS
        .write()
        .expect("urlconf registry lock poisoned")
        .insert(name.to_string(), Arc::new(conf));
    RESOLVERS.write().expect("resolver cache lock poisoned").remove(name);
    NS_RESOLVERS
        .write()
        .expect("namespace resolver cache lock poisoned")
        .clear();
    tracing::debug!(urlconf = name, "Registered URL configuration");
}

/// The configuration registered under `name`.
///
/// # Errors
///
/// Returns [`SwitchyardError::ImproperlyConfigured`] if nothing is registered.
pub fn load_urlconf(name: &str) -> SwitchyardResult<Arc<UrlConf>> {
    URLCONFS
        .read()
        .expect("urlconf registry lock poisoned")
        .get(name)
        .cloned()
        .ok_or_else(|| {
            SwitchyardError::ImproperlyConfigured(format!(
                "The included urlconf {name} doesn't have any patterns in it"
            ))
        })
}

/// Registers `view` under a dotted path such as `"blog.views.archive"`.
pub fn register_view(path: &str, view: View) {
    VIEWS
        .write()
        .expect("view registry lock poisoned")
        .insert(path.to_string(), view);
}

/// The view registered under `path`, if any.
pub fn lookup_view(path: &str) -> Option<View> {
    VIEWS
        .read()
        .expect("view registry lock poisoned")
        .get(path)
        .cloned()
}

/// Resolves a dotted path to its registered view.
///
/// # Errors
///
/// Returns [`SwitchyardError::ViewDoesNotExist`] naming the module or the
/// attribute that couldn't be found.
pub fn get_callable(path: &str) -> SwitchyardResult<View> {
    if let Some(view) = lookup_view(path) {
        return Ok(view);
    }
    let (module, func) = path.rsplit_once('.').unwrap_or((path, ""));
    let module_known = VIEWS
        .read()
        .expect("view registry lock poisoned")
        .keys()
        .any(|registered| registered.rsplit_once('.').is_some_and(|(m, _)| m == module));
    if module_known {
        Err(SwitchyardError::ViewDoesNotExist(format!(
            "Tried {func} in module {module}. Error was: '{module}' has no view named '{func}'"
        )))
    } else {
        Err(SwitchyardError::ViewDoesNotExist(format!(
            "Could not import {module}. Error was: No module named {module}"
        )))
    }
}

fn default_urlconf() -> SwitchyardResult<String> {
    if let Some(urlconf) = context::get_urlconf() {
        return Ok(urlconf);
    }
    SETTINGS
        .try_get()
        .map(|settings| settings.root_urlconf.clone())
        .filter(|urlconf| !urlconf.is_empty())
        .ok_or_else(|| {
            SwitchyardError::ImproperlyConfigured(
                "The ROOT_URLCONF setting must be configured".to_string(),
            )
        })
}

/// The root resolver (`^/`) for `urlconf`.
///
/// With `None`, uses the current request's override, then the configured
/// root URL configuration. Resolvers are memoized per name.
///
/// # Errors
///
/// Returns [`SwitchyardError::ImproperlyConfigured`] when no configuration
/// name is available.
pub fn get_resolver(urlconf: Option<&str>) -> SwitchyardResult<Arc<URLResolver>> {
    let name = match urlconf {
        Some(name) => name.to_string(),
        None => default_urlconf()?,
    };
    if let Some(resolver) = RESOLVERS
        .read()
        .expect("resolver cache lock poisoned")
        .get(&name)
    {
        return Ok(Arc::clone(resolver));
    }
    let resolver = Arc::new(URLResolver::root(UrlConfSource::Module(name.clone()))?);
    Ok(Arc::clone(
        RESOLVERS
            .write()
            .expect("resolver cache lock poisoned")
            .entry(name)
            .or_insert(resolver),
    ))
}

/// A root resolver over a namespaced resolver's entries, mounted under the
/// accumulated namespace prefix `ns_pattern`.
///
/// The prefix may contain capture groups, which then take part in reverse
/// lookup like any other parameter.
///
/// # Errors
///
/// Fails if `ns_pattern` isn't a valid regex or the entries can't be loaded.
pub fn get_ns_resolver(ns_pattern: &str, resolver: &Arc<URLResolver>) -> SwitchyardResult<Arc<URLResolver>> {
    let key = (ns_pattern.to_string(), Arc::as_ptr(resolver) as usize);
    if let Some((_, cached)) = NS_RESOLVERS
        .read()
        .expect("namespace resolver cache lock poisoned")
        .get(&key)
    {
        return Ok(Arc::clone(cached));
    }
    let inner = URLResolver::new(
        ns_pattern.into(),
        UrlConfSource::Inline(resolver.url_conf()?),
        HashMap::new(),
        None,
        None,
    )?;
    let inner = URLEntry::Resolver(Arc::new(inner));
    let wrapped = Arc::new(URLResolver::root(vec![inner])?);
    let mut cache = NS_RESOLVERS
        .write()
        .expect("namespace resolver cache lock poisoned");
    let (_, cached) = cache
        .entry(key)
        .or_insert_with(|| (Arc::clone(resolver), wrapped));
    Ok(Arc::clone(cached))
}

/// Drops every memoized resolver and namespace resolver.
pub fn clear_url_caches() {
    RESOLVERS.write().expect("resolver cache lock poisoned").clear();
    NS_RESOLVERS
        .write()
        .expect("namespace resolver cache lock poisoned")
        .clear();
}

/// Resolves `path` against `urlconf` (or the current default).
///
/// # Errors
///
/// As [`URLResolver::resolve`] and [`get_resolver`].
pub fn resolve(path: &str, urlconf: Option<&str>) -> SwitchyardResult<ResolverMatch> {
    get_resolver(urlconf)?.resolve(path)
}

/// Whether `path` resolves against `urlconf` (or the current default).
pub fn is_valid_path(path: &str, urlconf: Option<&str>) -> bool {
    resolve(path, urlconf).is_ok()
}
