//! System utility functions: the subprocess boundary and tool discovery

use crate::config::schema::Settings;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable that overrides every other VBoxManage lookup.
pub const VBOXMANAGE_ENV: &str = "VBOXCTL_VBOXMANAGE";

/// Get current UTC timestamp in RFC3339 format
pub fn now_utc() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Exit status and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Turns a non-zero exit status into [`Error::Command`].
    pub fn into_checked(self) -> Result<String> {
        if self.success() {
            Ok(self.output)
        } else {
            Err(Error::Command {
                exit_code: self.status,
                output: self.output,
            })
        }
    }
}

/// Runs an argument vector (program first) and waits for it to exit.
///
/// A non-zero exit status is a normal outcome and must be returned as data;
/// only a failure to start the process is an error.
pub trait CommandRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// Runs commands as real child processes, without a shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::InvalidConfig("empty command line".to_string()))?;

        let out = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| Error::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        // Killed by a signal: no exit code to report.
        let status = out.status.code().unwrap_or(-1);

        Ok(CommandOutput { status, output })
    }
}

/// Pick the VBoxManage binary: env override, then settings, then PATH and
/// the usual install locations.
pub fn locate_vboxmanage(settings: &Settings) -> Result<PathBuf> {
    let env_override = std::env::var_os(VBOXMANAGE_ENV).map(PathBuf::from);
    pick_vboxmanage(env_override, settings.vboxmanage.as_deref())
}

fn pick_vboxmanage(env_override: Option<PathBuf>, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = env_override {
        return Ok(p);
    }
    if let Some(p) = configured {
        return Ok(p.to_path_buf());
    }

    let candidates: &[&str] = &[
        "VBoxManage",
        "vboxmanage",
        "/usr/bin/VBoxManage",
        "/usr/local/bin/VBoxManage",
        "/Applications/VirtualBox.app/Contents/MacOS/VBoxManage",
        "C:\\Program Files\\Oracle\\VirtualBox\\VBoxManage.exe",
    ];

    for c in candidates {
        let p = if Path::new(c).is_absolute() {
            PathBuf::from(c)
        } else {
            match which::which(c) {
                Ok(p) => p,
                Err(_) => continue,
            }
        };
        if p.is_file() {
            return Ok(p);
        }
    }
    Err(Error::ToolNotFound)
}
