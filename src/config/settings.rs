//! Widget settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to each
//! subsystem by value.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::language::{default_languages, Language};

/// Environment variable that overrides `backend.base_url` after loading.
pub const API_URL_ENV: &str = "CHAT_WIDGET_API_URL";

// ---------------------------------------------------------------------------
// WidgetConfig
// ---------------------------------------------------------------------------

/// Settings supplied by the embedding page; static for the widget's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Name the agent introduces itself with in the welcome message.
    pub agent_name: String,
    /// System prompt / persona.  Primes the remote session and fingerprints
    /// the stored history.
    pub context: String,
    /// Whether the voice toggle is offered at all.
    pub enable_voice: bool,
    /// Language code used when no valid preference is stored.
    pub default_language: String,
    /// Languages the user can pick from.
    pub supported_languages: Vec<Language>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            agent_name: "HelperBot".into(),
            context: "You are a helpful assistant".into(),
            enable_voice: true,
            default_language: "en".into(),
            supported_languages: default_languages(),
        }
    }
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Connection settings for the remote chat backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL the `/chat/*` routes hang off, without a trailing slash.
    pub base_url: String,
    /// Maximum seconds to wait for any backend call.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Durable local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prefix for every storage key (`{namespace}-chat-history`, ...).
    pub namespace: String,
    /// Maximum number of messages kept in the stored history.
    pub max_messages: usize,
    /// Directory for the file store.  `None` uses the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "chat-widget".into(),
            max_messages: 50,
            data_dir: None,
        }
    }
}

impl StorageConfig {
    /// Directory the file store should use.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().data_dir)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use chat_widget::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Widget behaviour as seen by the embedding page.
    pub widget: WidgetConfig,
    /// Remote backend connection.
    pub backend: BackendConfig,
    /// Local persistence.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`,
    /// then apply environment overrides.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&AppPaths::new().settings_file)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace `backend.base_url` with `CHAT_WIDGET_API_URL` when it is set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            self.override_base_url(&url);
        }
    }

    fn override_base_url(&mut self, url: &str) {
        let url = url.trim().trim_end_matches('/');
        if !url.is_empty() {
            log::info!("config: backend URL overridden to {url}");
            self.backend.base_url = url.to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
