//! Hierarchical URL resolution and the reverse index.
//!
//! A [`URLResolver`] matches a prefix regex and hands the rest of the path to
//! its entries in declared order. Entries are leaf [`URLPattern`]s or nested
//! resolvers created by [`include`](super::conf::include). The first entry to
//! match wins; failures are collected into a "tried" trail that ends up in
//! [`SwitchyardError::Resolver404`].
//!
//! Reverse lookup tables (names and views to path templates, namespaces,
//! application instances) are built lazily, once per active language.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use switchyard_core::{i18n, SwitchyardError, SwitchyardResult};

use super::conf::{UrlConf, UrlConfSource};
use super::locale::{LocaleCache, LocaleRegex, PatternSource};
use super::pattern::{Callback, URLPattern};
use super::regex_helper::{normalize, UrlTemplate};
use super::registry;
use crate::defaults;
use crate::utils::urlquote;
use crate::view::View;

/// The result of resolving a path.
#[derive(Debug, Clone)]
pub struct ResolverMatch {
    /// The matched view.
    pub func: View,
    /// Positional captures (empty when the pattern has named groups).
    pub args: Vec<String>,
    /// Named captures merged with default keyword arguments.
    pub kwargs: HashMap<String, String>,
    /// The pattern's name, or the view's name for unnamed patterns.
    pub url_name: String,
    /// The application namespace of the innermost include declaring one.
    pub app_name: Option<String>,
    /// Instance namespaces, outermost first.
    pub namespaces: Vec<String>,
}

impl ResolverMatch {
    /// Creates a match. A missing `url_name` defaults to the view's name.
    pub fn new(
        func: View,
        args: Vec<String>,
        kwargs: HashMap<String, String>,
        url_name: Option<String>,
        app_name: Option<String>,
        namespaces: Vec<String>,
    ) -> Self {
        let url_name = url_name.unwrap_or_else(|| func.name().to_string());
        Self {
            func,
            args,
            kwargs,
            url_name,
            app_name,
            namespaces,
        }
    }

    /// The namespaces joined with `:`.
    pub fn namespace(&self) -> String {
        self.namespaces.join(":")
    }

    /// The namespaced name, e.g. `"admin:auth:user_list"`.
    pub fn view_name(&self) -> String {
        let mut parts: Vec<&str> = self.namespaces.iter().map(String::as_str).collect();
        parts.push(&self.url_name);
        parts.join(":")
    }
}

/// An entry of a URL configuration.
#[derive(Debug)]
pub enum URLEntry {
    /// A leaf pattern.
    Pattern(URLPattern),
    /// A nested resolver.
    Resolver(Arc<URLResolver>),
}

impl URLEntry {
    /// The entry's regex text for the active language.
    pub fn pattern(&self) -> String {
        match self {
            Self::Pattern(p) => p.pattern(),
            Self::Resolver(r) => r.pattern(),
        }
    }
}

/// The error views a URL configuration can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 403.
    PermissionDenied,
    /// 404.
    NotFound,
    /// 500.
    ServerError,
}

impl ErrorKind {
    /// The HTTP status code.
    pub const fn code(self) -> u16 {
        match self {
            Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::ServerError => 500,
        }
    }
}

/// Key of the reverse index: a pattern name or a view identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    /// A pattern name or dotted view path.
    Name(String),
    /// A view, by [`View::id`].
    View(usize),
}

#[derive(Debug, Clone)]
struct Candidate {
    templates: Vec<UrlTemplate>,
    pattern: String,
    defaults: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub(crate) struct ReverseTables {
    lookups: HashMap<LookupKey, Vec<Candidate>>,
    namespaces: HashMap<String, (String, Arc<URLResolver>)>,
    apps: HashMap<String, Vec<String>>,
}

impl ReverseTables {
    fn push(&mut self, key: LookupKey, candidate: Candidate) {
        self.lookups.entry(key).or_default().push(candidate);
    }
}

/// Compiled re-validation regexes, shared by every resolver.
static VALIDATION_REGEXES: Lazy<RwLock<HashMap<String, Arc<Regex>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn validation_regex(pattern: &str) -> SwitchyardResult<Arc<Regex>> {
    if let Some(regex) = VALIDATION_REGEXES
        .read()
        .expect("validation regex cache lock poisoned")
        .get(pattern)
    {
        return Ok(Arc::clone(regex));
    }
    let regex = Arc::new(Regex::new(pattern).map_err(|e| {
        SwitchyardError::ImproperlyConfigured(format!("Can't compile \"{pattern}\": {e}"))
    })?);
    VALIDATION_REGEXES
        .write()
        .expect("validation regex cache lock poisoned")
        .insert(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

fn strip_caret(pattern: &str) -> &str {
    pattern.strip_prefix('^').unwrap_or(pattern)
}

/// A prefix regex plus an ordered list of entries.
pub struct URLResolver {
    regex: LocaleRegex,
    source: UrlConfSource,
    conf: OnceCell<Arc<UrlConf>>,
    default_kwargs: HashMap<String, String>,
    namespace: Option<String>,
    app_name: Option<String>,
    tables: LocaleCache<ReverseTables>,
}

impl fmt::Debug for URLResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("URLResolver")
            .field("regex", &self.regex)
            .field("source", &self.source)
            .field("namespace", &self.namespace)
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

impl URLResolver {
    /// Creates a resolver, compiling its prefix regex for the active language.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchyardError::ImproperlyConfigured`] if the regex is invalid.
    pub fn new(
        source: PatternSource,
        conf: UrlConfSource,
        default_kwargs: HashMap<String, String>,
        namespace: Option<&str>,
        app_name: Option<&str>,
    ) -> SwitchyardResult<Self> {
        Ok(Self {
            regex: LocaleRegex::compiled(source)?,
            source: conf,
            conf: OnceCell::new(),
            default_kwargs,
            namespace: namespace.map(String::from),
            app_name: app_name.map(String::from),
            tables: LocaleCache::default(),
        })
    }

    /// A root resolver (`^/`) over `conf`.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`URLResolver::new`].
    pub fn root(conf: impl Into<UrlConfSource>) -> SwitchyardResult<Self> {
        Self::new("^/".into(), conf.into(), HashMap::new(), None, None)
    }

    /// The prefix regex text for the active language.
    pub fn pattern(&self) -> String {
        self.regex.pattern()
    }

    /// Whether this resolver's prefix is the active language code.
    pub fn is_locale_prefixed(&self) -> bool {
        *self.regex.source() == PatternSource::LanguagePrefix
    }

    /// The instance namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The application namespace.
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// Keyword arguments added to every match below this resolver.
    pub const fn default_kwargs(&self) -> &HashMap<String, String> {
        &self.default_kwargs
    }

    /// The URL configuration this resolver dispatches over.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchyardError::ImproperlyConfigured`] if a named
    /// configuration isn't registered.
    pub fn url_conf(&self) -> SwitchyardResult<Arc<UrlConf>> {
        self.conf
            .get_or_try_init(|| match &self.source {
                UrlConfSource::Inline(conf) => Ok(Arc::clone(conf)),
                UrlConfSource::Module(name) => registry::load_urlconf(name),
            })
            .cloned()
    }

    /// Resolves `path` to a view.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchyardError::Resolver404`] with the tried trail when no
    /// entry matches; other errors (unknown dotted views, invalid regexes)
    /// propagate unchanged.
    pub fn resolve(&self, path: &str) -> SwitchyardResult<ResolverMatch> {
        let regex = self.regex.regex()?;
        let Some(prefix) = regex.captures(path) else {
            return Err(SwitchyardError::unresolved(path, Vec::new()));
        };
        let end = prefix.get(0).map_or(0, |m| m.end());
        let new_path = &path[end..];
        let conf = self.url_conf()?;
        let mut tried: Vec<Vec<String>> = Vec::new();

        for entry in conf.patterns() {
            let sub_match = match entry {
                URLEntry::Pattern(pattern) => pattern.resolve(new_path)?,
                URLEntry::Resolver(resolver) => match resolver.resolve(new_path) {
                    Ok(sub_match) => Some(sub_match),
                    Err(SwitchyardError::Resolver404(unresolved)) => {
                        if unresolved.tried.is_empty() {
                            tried.push(vec![entry.pattern()]);
                        } else {
                            let head = entry.pattern();
                            for trail in unresolved.tried {
                                let mut chain = Vec::with_capacity(trail.len() + 1);
                                chain.push(head.clone());
                                chain.extend(trail);
                                tried.push(chain);
                            }
                        }
                        continue;
                    }
                    Err(other) => return Err(other),
                },
            };
            let Some(sub_match) = sub_match else {
                tried.push(vec![entry.pattern()]);
                continue;
            };

            let mut kwargs: HashMap<String, String> = regex
                .capture_names()
                .flatten()
                .filter_map(|name| prefix.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect();
            kwargs.extend(self.default_kwargs.clone());
            kwargs.extend(sub_match.kwargs);

            let mut namespaces = Vec::with_capacity(sub_match.namespaces.len() + 1);
            namespaces.extend(self.namespace.clone());
            namespaces.extend(sub_match.namespaces);

            return Ok(ResolverMatch {
                func: sub_match.func,
                args: sub_match.args,
                kwargs,
                url_name: sub_match.url_name,
                app_name: self.app_name.clone().or(sub_match.app_name),
                namespaces,
            });
        }
        Err(SwitchyardError::unresolved(new_path, tried))
    }

    /// The error view for `kind`: the configuration's own handler, or the
    /// library default.
    ///
    /// # Errors
    ///
    /// Fails if the configuration can't be loaded or its handler is an
    /// unknown dotted path.
    pub fn resolve_error(&self, kind: ErrorKind) -> SwitchyardResult<View> {
        if let Some(view) = self.custom_error_handler(kind)? {
            return Ok(view);
        }
        Ok(match kind {
            ErrorKind::PermissionDenied => defaults::permission_denied(),
            ErrorKind::NotFound => defaults::page_not_found(),
            ErrorKind::ServerError => defaults::server_error(),
        })
    }

    /// The configuration's own handler for `kind`, if it declares one.
    ///
    /// # Errors
    ///
    /// As [`resolve_error`](Self::resolve_error).
    pub fn custom_error_handler(&self, kind: ErrorKind) -> SwitchyardResult<Option<View>> {
        let conf = self.url_conf()?;
        conf.handler(kind).map(Callback::view).transpose()
    }

    // ── Reverse lookup ───────────────────────────────────────────────

    pub(crate) fn reverse_tables(&self) -> SwitchyardResult<Arc<ReverseTables>> {
        let language = i18n::get_language();
        self.tables.get_or_try_init(&language, || self.populate())
    }

    fn populate(&self) -> SwitchyardResult<ReverseTables> {
        let mut tables = ReverseTables::default();
        let conf = self.url_conf()?;

        for entry in conf.patterns().iter().rev() {
            let full_pattern = entry.pattern();
            let p_pattern = strip_caret(&full_pattern);
            match entry {
                URLEntry::Resolver(child) => {
                    if let Some(namespace) = child.namespace() {
                        tables
                            .namespaces
                            .insert(namespace.to_string(), (p_pattern.to_string(), Arc::clone(child)));
                        if let Some(app_name) = child.app_name() {
                            tables
                                .apps
                                .entry(app_name.to_string())
                                .or_default()
                                .push(namespace.to_string());
                        }
                        continue;
                    }
                    let parent = normalize(&full_pattern)?;
                    let child_tables = child.reverse_tables()?;
                    for (key, candidates) in &child_tables.lookups {
                        for candidate in candidates {
                            let templates = parent
                                .iter()
                                .flat_map(|prefix| candidate.templates.iter().map(move |t| prefix.concat(t)))
                                .collect();
                            let mut defaults = candidate.defaults.clone();
                            defaults.extend(child.default_kwargs.clone());
                            tables.push(
                                key.clone(),
                                Candidate {
                                    templates,
                                    pattern: format!("{p_pattern}{}", candidate.pattern),
                                    defaults,
                                },
                            );
                        }
                    }
                    for (namespace, (prefix, resolver)) in &child_tables.namespaces {
                        tables.namespaces.insert(
                            namespace.clone(),
                            (format!("{p_pattern}{prefix}"), Arc::clone(resolver)),
                        );
                    }
                    for (app_name, instances) in &child_tables.apps {
                        tables
                            .apps
                            .entry(app_name.clone())
                            .or_default()
                            .extend(instances.iter().cloned());
                    }
                }
                URLEntry::Pattern(pattern) => {
                    let candidate = Candidate {
                        templates: normalize(p_pattern)?,
                        pattern: p_pattern.to_string(),
                        defaults: pattern.default_args().clone(),
                    };
                    let view = pattern.callback().view()?;
                    tables.push(LookupKey::View(view.id()), candidate.clone());
                    if let Some(name) = pattern.name() {
                        tables.push(LookupKey::Name(name.to_string()), candidate);
                    }
                }
            }
        }
        tracing::debug!(
            prefix = %self.pattern(),
            lookups = tables.lookups.len(),
            namespaces = tables.namespaces.len(),
            "Populated reverse index"
        );
        Ok(tables)
    }

    /// Whether `key` has any reverse candidates for the active language.
    ///
    /// # Errors
    ///
    /// Fails if the reverse index can't be built.
    pub fn has_lookup(&self, key: &LookupKey) -> SwitchyardResult<bool> {
        Ok(self.reverse_tables()?.lookups.contains_key(key))
    }

    /// Instance namespaces registered for `app_name`, first registered first.
    ///
    /// # Errors
    ///
    /// Fails if the reverse index can't be built.
    pub fn app_instances(&self, app_name: &str) -> SwitchyardResult<Vec<String>> {
        Ok(self
            .reverse_tables()?
            .apps
            .get(app_name)
            .cloned()
            .unwrap_or_default())
    }

    /// The prefix pattern and resolver registered for `namespace`.
    ///
    /// # Errors
    ///
    /// Fails if the reverse index can't be built.
    pub fn namespace_entry(&self, namespace: &str) -> SwitchyardResult<Option<(String, Arc<Self>)>> {
        Ok(self
            .reverse_tables()?
            .namespaces
            .get(namespace)
            .map(|(prefix, resolver)| (prefix.clone(), Arc::clone(resolver))))
    }

    /// Builds a path for `key` from `args` or `kwargs`, prefixed by `prefix`.
    ///
    /// Positional arguments must match a template's parameter count;
    /// keyword arguments must match its parameter set (defaults included) and
    /// agree with any fixed default values. Each candidate path is checked
    /// against the pattern it came from before being returned.
    ///
    /// # Errors
    ///
    /// - [`SwitchyardError::InvalidArguments`] when both `args` and `kwargs`
    ///   are given.
    /// - [`SwitchyardError::NoReverseMatch`] when no candidate fits.
    pub fn reverse_with_prefix(
        &self,
        key: &LookupKey,
        display: &str,
        prefix: &str,
        args: &[String],
        kwargs: &HashMap<String, String>,
    ) -> SwitchyardResult<String> {
        if !args.is_empty() && !kwargs.is_empty() {
            return Err(SwitchyardError::InvalidArguments(
                "Don't mix *args and **kwargs in call to reverse()!".to_string(),
            ));
        }
        let tables = self.reverse_tables()?;
        let quoted_prefix = urlquote(prefix);
        let prefix_template = UrlTemplate::literal(&quoted_prefix);

        for candidate in tables.lookups.get(key).into_iter().flatten() {
            for template in &candidate.templates {
                let full = prefix_template.concat(template);
                let rendered = if args.is_empty() {
                    if !keyword_fit(&full, kwargs, &candidate.defaults) {
                        continue;
                    }
                    full.render(kwargs)
                } else {
                    if args.len() != full.params.len() {
                        continue;
                    }
                    let values = full.params.iter().cloned().zip(args.iter().cloned()).collect();
                    full.render(&values)
                };
                let Some(path) = rendered else { continue };
                let check = validation_regex(&format!(
                    "^{}(?:{})",
                    regex::escape(&quoted_prefix),
                    candidate.pattern
                ))?;
                if check.is_match(&path) {
                    return Ok(path);
                }
            }
        }

        let mut sorted_kwargs: Vec<_> = kwargs.iter().collect();
        sorted_kwargs.sort();
        Err(SwitchyardError::NoReverseMatch(format!(
            "Reverse for '{display}' with arguments '{args:?}' and keyword arguments '{sorted_kwargs:?}' not found."
        )))
    }
}

/// Whether `kwargs` (with `defaults`) supplies exactly the template's
/// parameters, without contradicting a fixed default.
fn keyword_fit(
    template: &UrlTemplate,
    kwargs: &HashMap<String, String>,
    defaults: &HashMap<String, String>,
) -> bool {
    let expected: Vec<&String> = template.params.iter().chain(defaults.keys()).collect();
    let supplied_ok = kwargs.keys().chain(defaults.keys()).all(|k| expected.contains(&k));
    let expected_ok = expected
        .iter()
        .all(|k| kwargs.contains_key(*k) || defaults.contains_key(*k));
    if !supplied_ok || !expected_ok {
        return false;
    }
    defaults
        .iter()
        .all(|(k, v)| kwargs.get(k).map_or(true, |supplied| supplied == v))
}
