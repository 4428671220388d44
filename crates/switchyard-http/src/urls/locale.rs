//! Language-aware pattern sources and per-language caches.
//!
//! A pattern may be a plain regex, a translatable message id, or the
//! active-language prefix of an [`i18n_patterns`](super::conf::i18n_patterns)
//! resolver. Everything derived from a pattern is therefore cached per
//! language code in a [`LocaleCache`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use regex::Regex;

use switchyard_core::i18n::{self, catalog};
use switchyard_core::{SwitchyardError, SwitchyardResult};

/// Where a pattern's regex text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSource {
    /// A literal regex.
    Regex(String),
    /// A message id translated through the active language's catalog.
    Translatable(String),
    /// `^{language}/` for the active language.
    LanguagePrefix,
}

impl PatternSource {
    /// The regex text for the active language.
    pub fn current(&self) -> String {
        match self {
            Self::Regex(regex) => regex.clone(),
            Self::Translatable(msgid) => {
                catalog::translate(&i18n::get_language(), msgid).unwrap_or_else(|| msgid.clone())
            }
            Self::LanguagePrefix => format!("^{}/", i18n::get_language()),
        }
    }
}

impl From<&str> for PatternSource {
    fn from(regex: &str) -> Self {
        Self::Regex(regex.to_string())
    }
}

impl From<String> for PatternSource {
    fn from(regex: String) -> Self {
        Self::Regex(regex)
    }
}

/// A pattern whose regex text is looked up in the translation catalog.
///
/// ```
/// use switchyard_http::urls::locale::{translatable, PatternSource};
///
/// assert_eq!(translatable("^about/$"), PatternSource::Translatable("^about/$".into()));
/// ```
pub fn translatable(msgid: &str) -> PatternSource {
    PatternSource::Translatable(msgid.to_string())
}

/// Values derived once per language code.
///
/// Concurrent first lookups for the same language block on a single build;
/// a failed build leaves the slot empty so the next lookup retries.
pub struct LocaleCache<T> {
    slots: RwLock<HashMap<String, Arc<OnceCell<Arc<T>>>>>,
}

impl<T> Default for LocaleCache<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> LocaleCache<T> {
    /// Returns the value for `language`, building it with `build` if needed.
    pub fn get_or_try_init<F>(&self, language: &str, build: F) -> SwitchyardResult<Arc<T>>
    where
        F: FnOnce() -> SwitchyardResult<T>,
    {
        let existing = self
            .slots
            .read()
            .expect("locale cache lock poisoned")
            .get(language)
            .cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => self
                .slots
                .write()
                .expect("locale cache lock poisoned")
                .entry(language.to_string())
                .or_default()
                .clone(),
        };
        slot.get_or_try_init(|| build().map(Arc::new)).cloned()
    }

    /// Whether a value has been built for `language`.
    pub fn is_built(&self, language: &str) -> bool {
        self.slots
            .read()
            .expect("locale cache lock poisoned")
            .get(language)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Drops every cached value.
    pub fn clear(&self) {
        self.slots.write().expect("locale cache lock poisoned").clear();
    }
}

/// A [`PatternSource`] with its compiled regex cached per language.
pub struct LocaleRegex {
    source: PatternSource,
    compiled: LocaleCache<Regex>,
}

impl fmt::Debug for LocaleRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocaleRegex").field(&self.source).finish()
    }
}

impl LocaleRegex {
    /// Wraps `source` without compiling it.
    pub fn new(source: PatternSource) -> Self {
        Self {
            source,
            compiled: LocaleCache::default(),
        }
    }

    /// Wraps `source` and compiles it for the active language.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchyardError::ImproperlyConfigured`] if the regex is invalid.
    pub fn compiled(source: PatternSource) -> SwitchyardResult<Self> {
        let regex = Self::new(source);
        regex.regex()?;
        Ok(regex)
    }

    /// The pattern's source.
    pub const fn source(&self) -> &PatternSource {
        &self.source
    }

    /// The regex text for the active language.
    pub fn pattern(&self) -> String {
        self.source.current()
    }

    /// The compiled regex for the active language.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchyardError::ImproperlyConfigured`] if the regex is invalid.
    pub fn regex(&self) -> SwitchyardResult<Arc<Regex>> {
        let language = i18n::get_language();
        self.compiled.get_or_try_init(&language, || {
            let pattern = self.source.current();
            Regex::new(&pattern).map_err(|e| {
                SwitchyardError::ImproperlyConfigured(format!(
                    "\"{pattern}\" is not a valid regular expression: {e}"
                ))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_plain_regex_source() {
        let regex = LocaleRegex::compiled("^articles/$".into()).unwrap();
        assert_eq!(regex.pattern(), "^articles/$");
        assert!(regex.regex().unwrap().is_match("articles/"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = LocaleRegex::compiled("^(unclosed/$".into()).unwrap_err();
        assert!(matches!(err, SwitchyardError::ImproperlyConfigured(_)));
    }

    #[test]
    fn test_translatable_source_follows_language() {
        catalog::register_translations("locale-test-nl", vec![("^locale-test/$", "^lokaal/$")]);
        let regex = LocaleRegex::new(translatable("^locale-test/$"));

        assert!(regex.regex().unwrap().is_match("locale-test/"));
        {
            let _guard = i18n::override_language("locale-test-nl");
            assert_eq!(regex.pattern(), "^lokaal/$");
            assert!(regex.regex().unwrap().is_match("lokaal/"));
        }
        // The default language's compiled regex is untouched.
        assert!(regex.regex().unwrap().is_match("locale-test/"));
        assert!(!regex.regex().unwrap().is_match("lokaal/"));
    }

    #[test]
    fn test_language_prefix_source() {
        let _guard = i18n::override_language("fr");
        assert_eq!(PatternSource::LanguagePrefix.current(), "^fr/");
    }

    #[test]
    fn test_locale_cache_builds_once_per_language() {
        let cache: LocaleCache<String> = LocaleCache::default();
        let builds = AtomicUsize::new(0);
        let build = |lang: &str| {
            cache.get_or_try_init(lang, || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(lang.to_uppercase())
            })
        };
        assert_eq!(*build("en").unwrap(), "EN");
        assert_eq!(*build("en").unwrap(), "EN");
        assert_eq!(*build("de").unwrap(), "DE");
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert!(cache.is_built("de"));

        cache.clear();
        assert!(!cache.is_built("de"));
    }

    #[test]
    fn test_locale_cache_failed_build_retries() {
        let cache: LocaleCache<u8> = LocaleCache::default();
        let err = cache.get_or_try_init("en", || {
            Err(SwitchyardError::ImproperlyConfigured("boom".into()))
        });
        assert!(err.is_err());
        assert!(!cache.is_built("en"));
        assert_eq!(*cache.get_or_try_init("en", || Ok(7)).unwrap(), 7);
    }
}
