use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use rowline_core::Settings;

pub fn default_settings_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "rowline")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("settings.toml");
    Some(path)
}

/// An explicit settings file must exist; the default one is optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()));
    }
    let Some(path) = default_settings_path() else {
        log::debug!("no config directory; using default settings");
        return Ok(Settings::default());
    };
    Settings::load_or_default(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))
}
