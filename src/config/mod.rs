//! Configuration module for the chat widget.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the widget,
//! backend and storage, `AppPaths` for cross-platform directories, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, BackendConfig, StorageConfig, WidgetConfig, API_URL_ENV};
