//! Active-language state.
//!
//! URL patterns may be declared as translatable strings, so the resolver keys
//! its compiled patterns and reverse index by the language active on the
//! calling thread. This module tracks that language and translates message
//! ids through [`catalog`].
//!
//! ```
//! use switchyard_core::i18n;
//!
//! i18n::catalog::register_translations("es", vec![("^about/$", "^acerca/$")]);
//! i18n::activate("es");
//! assert_eq!(i18n::gettext("^about/$"), "^acerca/$");
//! i18n::deactivate();
//! assert_eq!(i18n::gettext("^about/$"), "^about/$");
//! ```

pub mod catalog;

use std::cell::RefCell;

/// The language reported when nothing is active.
pub const DEFAULT_LANGUAGE: &str = "en";

// ── Thread-local language state ──────────────────────────────────────────

thread_local! {
    static CURRENT_LANGUAGE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Activates the given language code for the current thread.
pub fn activate(language_code: &str) {
    CURRENT_LANGUAGE.with(|cell| {
        *cell.borrow_mut() = Some(language_code.to_string());
    });
}

/// Deactivates the current thread's language, reverting to [`DEFAULT_LANGUAGE`].
pub fn deactivate() {
    CURRENT_LANGUAGE.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// Returns the language code active on the current thread.
pub fn get_language() -> String {
    CURRENT_LANGUAGE.with(|cell| {
        cell.borrow()
            .clone()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    })
}

/// Translates a message using the current thread's active language.
///
/// If no translation is found, returns the original `msgid`.
pub fn gettext(msgid: &str) -> String {
    let lang = get_language();
    catalog::translate(&lang, msgid).unwrap_or_else(|| msgid.to_string())
}

/// Activates `language_code` until the returned guard is dropped.
///
/// The previously active language (or none) is restored on drop.
///
/// ```
/// use switchyard_core::i18n;
///
/// {
///     let _guard = i18n::override_language("de");
///     assert_eq!(i18n::get_language(), "de");
/// }
/// assert_eq!(i18n::get_language(), "en");
/// ```
pub fn override_language(language_code: &str) -> LanguageGuard {
    let previous = CURRENT_LANGUAGE.with(|cell| cell.borrow().clone());
    activate(language_code);
    LanguageGuard { previous }
}

/// Restores the previous language when dropped. See [`override_language`].
#[must_use = "the language is restored as soon as the guard is dropped"]
pub struct LanguageGuard {
    previous: Option<String>,
}

impl Drop for LanguageGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_LANGUAGE.with(|cell| {
            *cell.borrow_mut() = previous;
        });
    }
}
