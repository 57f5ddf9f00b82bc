//! Language Registry and persisted language preference.
//!
//! [`LanguageRegistry`] is a fixed lookup table built from configuration.
//! Lookups never fail: unknown codes resolve to the configured default.
//! [`LanguagePreference`] stores the user's pick under
//! `{namespace}-language`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::prompt::directive_for;
use crate::config::WidgetConfig;
use crate::storage::{storage_key, KeyValueStore};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// One supported language.
///
/// Accepts the camelCase spellings (`nativeName`, `voiceCode`) used by
/// embedding pages as well as the snake_case TOML names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Short code, e.g. `"hi"`.
    pub code: String,
    /// English name, e.g. `"Hindi"`.
    pub name: String,
    /// Name in the language itself, e.g. `"हिन्दी"`.
    #[serde(alias = "nativeName")]
    pub native_name: String,
    /// Speech-recognition locale, e.g. `"hi-IN"`.
    #[serde(alias = "voiceCode", alias = "voiceLocale")]
    pub voice_locale: String,
    /// Optional replacement for the built-in response directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Language {
    pub fn new(code: &str, name: &str, native_name: &str, voice_locale: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            native_name: native_name.to_string(),
            voice_locale: voice_locale.to_string(),
            prompt: None,
        }
    }
}

/// English, Hindi and Spanish.
pub fn default_languages() -> Vec<Language> {
    vec![
        Language::new("en", "English", "English", "en-US"),
        Language::new("hi", "Hindi", "हिन्दी", "hi-IN"),
        Language::new("es", "Spanish", "Español", "es-ES"),
    ]
}

// ---------------------------------------------------------------------------
// LanguageRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<Language>,
    default_index: usize,
}

impl LanguageRegistry {
    /// Build a registry.  An empty list falls back to [`default_languages`];
    /// an unknown `default_code` falls back to the first entry.
    pub fn new(languages: Vec<Language>, default_code: &str) -> Self {
        let languages = if languages.is_empty() {
            log::warn!("language: no languages configured, using built-in set");
            default_languages()
        } else {
            languages
        };
        let default_index = languages
            .iter()
            .position(|l| l.code == default_code)
            .unwrap_or(0);
        Self {
            languages,
            default_index,
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(
            config.supported_languages.clone(),
            &config.default_language,
        )
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn default_language(&self) -> &Language {
        &self.languages[self.default_index]
    }

    pub fn get(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.code == code)
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// Entry for `code`, or the default entry.
    pub fn resolve(&self, code: &str) -> &Language {
        self.get(code).unwrap_or_else(|| self.default_language())
    }

    /// Response directive to prepend for `code`.
    pub fn directive(&self, code: &str) -> String {
        directive_for(self.resolve(code))
    }

    pub fn display_name(&self, code: &str) -> &str {
        &self.resolve(code).native_name
    }

    pub fn voice_locale(&self, code: &str) -> &str {
        &self.resolve(code).voice_locale
    }

    /// Code to start with: the stored preference if it is supported,
    /// otherwise the default.
    pub fn initial_code(&self, preference: Option<&str>) -> &str {
        match preference {
            Some(code) if self.is_supported(code) => &self.resolve(code).code,
            Some(code) => {
                log::debug!("language: stored preference `{code}` unsupported, using default");
                &self.default_language().code
            }
            None => &self.default_language().code,
        }
    }
}

// ---------------------------------------------------------------------------
// LanguagePreference
// ---------------------------------------------------------------------------

/// Persists the selected language code; storage failures are logged only.
pub struct LanguagePreference {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LanguagePreference {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        Self {
            store,
            key: storage_key(namespace, "language"),
        }
    }

    pub fn load(&self) -> Option<String> {
        match self.store.get(&self.key) {
            Ok(code) => code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            Err(e) => {
                log::warn!("language: failed to load preference: {e}");
                None
            }
        }
    }

    pub fn save(&self, code: &str) {
        if let Err(e) = self.store.set(&self.key, code) {
            log::warn!("language: failed to save preference: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
