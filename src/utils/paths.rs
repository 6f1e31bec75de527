//! Path utility functions

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Environment variable pointing at an alternative settings file.
pub const CONFIG_ENV: &str = "VBOXCTL_CONFIG";

/// Get the vboxctl configuration directory path
pub fn config_home() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| Error::InvalidConfig("no configuration directory found".to_string()))?
        .join("vboxctl"))
}

/// Get the settings file path
pub fn settings_path() -> Result<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(p));
    }
    Ok(config_home()?.join("settings.json"))
}

/// Resolve path under root directory
pub fn resolve_under_root(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Absolute, lexically normalized form of `p` (relative paths resolve
/// against the current directory). The file does not need to exist.
pub fn absolute_path(p: &Path) -> Result<PathBuf> {
    let joined = resolve_under_root(&std::env::current_dir()?, p);
    Ok(normalize(&joined))
}

fn normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in p.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
