//! Tunables for the data source, read from `settings.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_PAGE_TTL_MS: u64 = 3000;
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rows per fetched page.
    pub page_size: usize,
    /// Loaded pages untouched for longer than this are evicted.
    pub page_ttl_ms: u64,
    /// Rule/recompute passes allowed per row while draining one batch of edits.
    pub max_cascade_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            page_size: DEFAULT_PAGE_SIZE,
            page_ttl_ms: DEFAULT_PAGE_TTL_MS,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

impl Settings {
    pub fn from_toml_str(source: &str) -> Result<Settings> {
        let settings: Settings =
            toml::from_str(source).map_err(|e| Error::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Settings> {
        let content = std::fs::read_to_string(path)?;
        Settings::from_toml_str(&content)
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Settings> {
        if path.exists() {
            Settings::load(path)
        } else {
            Ok(Settings::default())
        }
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_millis(self.page_ttl_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Settings("page_size must be at least 1".to_string()));
        }
        if self.max_cascade_depth == 0 {
            return Err(Error::Settings(
                "max_cascade_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
