//! Leaf URL patterns.
//!
//! A [`URLPattern`] binds a regex to a view. The view is either a [`View`]
//! value or a dotted path looked up in the view registry the first time the
//! pattern is used.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::OnceCell;
use regex::Regex;

use switchyard_core::{SwitchyardError, SwitchyardResult};

use super::locale::{LocaleRegex, PatternSource};
use super::registry;
use super::resolver::ResolverMatch;
use crate::view::View;

/// The view a pattern dispatches to.
pub enum Callback {
    /// A view value.
    View(View),
    /// A dotted path resolved through [`registry::get_callable`].
    Path {
        /// The dotted path, e.g. `"blog.views.archive"`.
        path: String,
        /// The view once resolved.
        resolved: OnceCell<View>,
    },
}

impl Callback {
    /// A callback resolved lazily from a dotted path.
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            resolved: OnceCell::new(),
        }
    }

    /// Returns the view, resolving a dotted path on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchyardError::ViewDoesNotExist`] if the path isn't registered.
    pub fn view(&self) -> SwitchyardResult<View> {
        match self {
            Self::View(view) => Ok(view.clone()),
            Self::Path { path, resolved } => resolved
                .get_or_try_init(|| registry::get_callable(path))
                .cloned(),
        }
    }

    /// The dotted path, for path callbacks.
    pub fn dotted_path(&self) -> Option<&str> {
        match self {
            Self::View(_) => None,
            Self::Path { path, .. } => Some(path),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::View(view) => f.debug_tuple("View").field(&view.name()).finish(),
            Self::Path { path, .. } => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

impl From<View> for Callback {
    fn from(view: View) -> Self {
        Self::View(view)
    }
}

impl From<&View> for Callback {
    fn from(view: &View) -> Self {
        Self::View(view.clone())
    }
}

impl From<&str> for Callback {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<String> for Callback {
    fn from(path: String) -> Self {
        Self::path(path)
    }
}

/// A regex bound to a view.
#[derive(Debug)]
pub struct URLPattern {
    regex: LocaleRegex,
    callback: Callback,
    default_args: HashMap<String, String>,
    name: Option<String>,
}

impl URLPattern {
    /// Creates a pattern, compiling its regex for the active language.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchyardError::ImproperlyConfigured`] if the regex is
    /// invalid or a dotted-path callback is empty.
    pub fn new(
        source: PatternSource,
        callback: Callback,
        default_args: HashMap<String, String>,
        name: Option<&str>,
    ) -> SwitchyardResult<Self> {
        if callback.dotted_path() == Some("") {
            return Err(SwitchyardError::ImproperlyConfigured(format!(
                "Empty URL pattern view name not permitted (for pattern {:?})",
                source.current()
            )));
        }
        Ok(Self {
            regex: LocaleRegex::compiled(source)?,
            callback,
            default_args,
            name: name.map(String::from),
        })
    }

    /// The pattern's regex wrapper.
    pub const fn regex(&self) -> &LocaleRegex {
        &self.regex
    }

    /// The regex text for the active language.
    pub fn pattern(&self) -> String {
        self.regex.pattern()
    }

    /// The pattern's name, used for reverse lookup.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Extra keyword arguments passed to the view on every match.
    pub const fn default_args(&self) -> &HashMap<String, String> {
        &self.default_args
    }

    /// The pattern's callback.
    pub const fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Prepends `prefix` to a dotted-path callback. View callbacks are untouched.
    pub fn add_prefix(&mut self, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        if let Callback::Path { path, resolved } = &mut self.callback {
            *path = format!("{prefix}.{path}");
            *resolved = OnceCell::new();
        }
    }

    /// Matches `path` against the pattern.
    ///
    /// Returns `Ok(None)` when the regex doesn't match. If the regex has any
    /// named groups, only named groups are captured (as keyword arguments);
    /// otherwise every group is captured positionally.
    ///
    /// # Errors
    ///
    /// Fails if the callback can't be resolved to a view.
    pub fn resolve(&self, path: &str) -> SwitchyardResult<Option<ResolverMatch>> {
        let regex = self.regex.regex()?;
        let Some((args, mut kwargs)) = captures(&regex, path) else {
            return Ok(None);
        };
        for (key, value) in &self.default_args {
            kwargs.insert(key.clone(), value.clone());
        }
        Ok(Some(ResolverMatch::new(
            self.callback.view()?,
            args,
            kwargs,
            self.name.clone(),
            None,
            Vec::new(),
        )))
    }
}

/// Searches `path` with `regex` and splits the captures into positional and
/// keyword arguments.
///
/// Named groups that didn't participate are left out; positional groups that
/// didn't participate become empty strings.
fn captures(
    regex: &Regex,
    path: &str,
) -> Option<(Vec<String>, HashMap<String, String>)> {
    let caps = regex.captures(path)?;
    let has_named = regex.capture_names().flatten().next().is_some();
    if has_named {
        let kwargs = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some((Vec::new(), kwargs))
    } else {
        let args = caps
            .iter()
            .skip(1)
            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
            .collect();
        Some((args, HashMap::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::HttpResponse;

    fn view(name: &str) -> View {
        View::new(name, |_req| async { Ok(HttpResponse::ok("")) })
    }

    fn pattern(regex: &str, name: Option<&str>) -> URLPattern {
        URLPattern::new(regex.into(), view("v").into(), HashMap::new(), name).unwrap()
    }

    #[test]
    fn test_literal_match() {
        let p = pattern("^about/$", Some("about"));
        let m = p.resolve("about/").unwrap().unwrap();
        assert!(m.args.is_empty());
        assert!(m.kwargs.is_empty());
        assert_eq!(m.url_name, "about");
        assert!(p.resolve("about/team/").unwrap().is_none());
    }

    #[test]
    fn test_named_groups_win_over_positional() {
        let p = pattern(r"^(\d+)/(?P<slug>[-\w]+)/$", None);
        let m = p.resolve("12/hello-world/").unwrap().unwrap();
        assert!(m.args.is_empty());
        assert_eq!(m.kwargs.get("slug").map(String::as_str), Some("hello-world"));
        assert_eq!(m.kwargs.len(), 1);
    }

    #[test]
    fn test_positional_groups() {
        let p = pattern(r"^(\d{4})/(\d{2})?/?$", None);
        let m = p.resolve("2024/").unwrap().unwrap();
        assert_eq!(m.args, vec!["2024".to_string(), String::new()]);
    }

    #[test]
    fn test_non_participating_named_group_is_omitted() {
        let p = pattern(r"^page(?:-(?P<num>\d+))?/$", None);
        let m = p.resolve("page/").unwrap().unwrap();
        assert!(m.kwargs.is_empty());
    }

    #[test]
    fn test_default_args_are_merged() {
        let mut defaults = HashMap::new();
        defaults.insert("format".to_string(), "json".to_string());
        let p = URLPattern::new("^feed/$".into(), view("feed").into(), defaults, None).unwrap();
        let m = p.resolve("feed/").unwrap().unwrap();
        assert_eq!(m.kwargs.get("format").map(String::as_str), Some("json"));
        assert_eq!(m.url_name, "feed");
    }

    #[test]
    fn test_search_semantics() {
        let p = pattern("articles/", None);
        assert!(p.resolve("blog/articles/").unwrap().is_some());
    }

    #[test]
    fn test_dotted_path_callback() {
        let archive = view("pattern-tests.views.archive");
        registry::register_view("pattern-tests.views.archive", archive.clone());

        let mut p = URLPattern::new(
            "^archive/$".into(),
            Callback::path("views.archive"),
            HashMap::new(),
            None,
        )
        .unwrap();
        assert!(matches!(
            p.resolve("archive/"),
            Err(SwitchyardError::ViewDoesNotExist(_))
        ));

        p.add_prefix("pattern-tests");
        assert_eq!(p.callback().dotted_path(), Some("pattern-tests.views.archive"));
        let m = p.resolve("archive/").unwrap().unwrap();
        assert!(m.func.ptr_eq(&archive));
    }

    #[test]
    fn test_empty_view_path_rejected() {
        let err = URLPattern::new("^x/$".into(), Callback::path(""), HashMap::new(), None).unwrap_err();
        assert!(matches!(err, SwitchyardError::ImproperlyConfigured(_)));
    }
}
