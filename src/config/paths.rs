//! Where the widget keeps its files.
//!
//! `settings.toml` sits in a `chat-widget` folder under the platform config
//! directory; the key/value store sits in `chat-widget/store` under the
//! platform local-data directory.  A platform without either directory gets
//! the working directory instead.

use std::path::PathBuf;

pub const APP_NAME: &str = "chat-widget";

const SETTINGS_FILE: &str = "settings.toml";
const STORE_DIR: &str = "store";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Backing directory for [`FileStore`](crate::storage::FileStore).
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Paths under the current user's platform directories.
    pub fn new() -> Self {
        Self::under(dirs::config_dir(), dirs::data_local_dir())
    }

    /// Lay the widget's folders out below the given base directories.
    pub fn under(config_base: Option<PathBuf>, data_base: Option<PathBuf>) -> Self {
        let app_root = |base: Option<PathBuf>| {
            base.unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME)
        };

        let config_dir = app_root(config_base);
        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            data_dir: app_root(data_base).join(STORE_DIR),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
