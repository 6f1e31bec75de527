//! Settings file loading

pub mod schema;

use crate::error::Result;
use crate::utils::paths::settings_path;
use schema::Settings;
use std::fs::File;
use std::path::Path;

/// Load the settings file, falling back to defaults when there is none.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&settings_path()?)
}

/// Load settings from an explicit path; a missing file yields defaults.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }
    let f = File::open(path)?;
    let settings: Settings = serde_json::from_reader(f)?;
    Ok(settings)
}
