//! Error types shared by the library

use std::io;

/// Errors raised while driving VBoxManage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("VBoxManage exited with code {exit_code}:\n{output}")]
    Command { exit_code: i32, output: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected VBoxManage output: {0}")]
    Parse(String),

    #[error("unrecognized {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("VM '{0}' not found")]
    VmNotFound(String),

    #[error("VirtualBox is not installed on this machine")]
    NotInstalled,

    #[error("VBoxManage not found (set VBOXCTL_VBOXMANAGE or install VirtualBox)")]
    ToolNotFound,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        Error::InvalidValue {
            kind,
            value: value.into(),
        }
    }

    /// Exit code reported by VBoxManage, if this is a command failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::Command { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
