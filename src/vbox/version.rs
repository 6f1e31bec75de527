//! VirtualBox version detection

use serde::Serialize;

/// What `VBoxManage --version` says about the installed package.
///
/// All fields are `None` when VirtualBox is not installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Public release number, e.g. `3.0.4`.
    pub release: Option<String>,
    /// SVN revision the build is based on.
    pub svn: Option<u32>,
    /// `""` for the personal edition, `"OSE"` for the open-source edition.
    pub edition: Option<String>,
}

impl VersionInfo {
    /// Parses `<release>[_<edition>][r<svn>]`.
    pub fn parse(output: &str) -> Self {
        let mut rest = output.trim();

        let svn = match rest.rfind('r') {
            Some(offset) => {
                let revision = rest[offset + 1..].parse().ok();
                rest = &rest[..offset];
                revision
            }
            None => None,
        };

        let edition = match rest.rfind('_') {
            Some(offset) => {
                let edition = rest[offset + 1..].to_string();
                rest = &rest[..offset];
                edition
            }
            None => String::new(),
        };

        VersionInfo {
            release: Some(rest.to_string()),
            svn,
            edition: Some(edition),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.edition.is_some()
    }
}
