//! Translation catalog for translatable URL patterns.
//!
//! The catalog stores message translations in a global, thread-safe registry
//! keyed by language code. Translations can be loaded from JSON or registered
//! programmatically.
//!
//! ## JSON Format
//!
//! ```json
//! {
//!   "messages": {
//!     "^articles/$": "^articulos/$"
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Message translations for a single language: msgid -> translated string.
type Catalog = HashMap<String, String>;

fn global_catalogs() -> &'static RwLock<HashMap<String, Catalog>> {
    static CATALOGS: OnceLock<RwLock<HashMap<String, Catalog>>> = OnceLock::new();
    CATALOGS.get_or_init(|| RwLock::new(HashMap::new()))
}

// ── Registration API ─────────────────────────────────────────────────────

/// Registers message translations for a language.
///
/// Each entry is a `(msgid, translated)` pair. Existing entries for the
/// language are merged, new values overwriting duplicates.
///
/// # Examples
///
/// ```
/// use switchyard_core::i18n::catalog;
///
/// catalog::register_translations("fr", vec![("^about/$", "^a-propos/$")]);
/// assert_eq!(catalog::translate("fr", "^about/$").as_deref(), Some("^a-propos/$"));
/// ```
pub fn register_translations(language: &str, entries: Vec<(&str, &str)>) {
    let mut catalogs = global_catalogs().write().expect("catalog lock poisoned");
    let catalog = catalogs.entry(language.to_string()).or_default();
    for (msgid, translated) in entries {
        catalog.insert(msgid.to_string(), translated.to_string());
    }
}

/// Loads message translations from a JSON string.
///
/// # Errors
///
/// Returns `Err` if the JSON is invalid.
pub fn load_from_json(language: &str, json_str: &str) -> Result<(), String> {
    let value: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| format!("Invalid JSON: {e}"))?;

    let entries: Vec<(String, String)> = value
        .get("messages")
        .and_then(|v| v.as_object())
        .map(|messages| {
            messages
                .iter()
                .filter_map(|(msgid, t)| t.as_str().map(|t| (msgid.clone(), t.to_string())))
                .collect()
        })
        .unwrap_or_default();

    register_translations(
        language,
        entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
    );
    Ok(())
}

// ── Lookup API ───────────────────────────────────────────────────────────

/// Looks up a translation in the catalog.
pub fn translate(language: &str, msgid: &str) -> Option<String> {
    let catalogs = global_catalogs().read().expect("catalog lock poisoned");
    catalogs.get(language).and_then(|c| c.get(msgid).cloned())
}

/// Returns `true` if translations are registered for the given language.
pub fn has_language(language: &str) -> bool {
    let catalogs = global_catalogs().read().expect("catalog lock poisoned");
    catalogs.contains_key(language)
}

/// Clears all translations for a given language.
pub fn clear_language(language: &str) {
    let mut catalogs = global_catalogs().write().expect("catalog lock poisoned");
    catalogs.remove(language);
}
