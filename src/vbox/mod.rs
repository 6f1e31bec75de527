//! The VirtualBox context: how to reach VBoxManage, plus the lookup tables
//! that are expensive to query and rarely change.

pub mod os_types;
pub mod parse;
pub mod version;

use crate::config::schema::Settings;
use crate::error::{Error, Result};
use crate::utils::system::{locate_vboxmanage, CommandOutput, CommandRunner, SystemRunner};
use crate::vm::nic::normalize_mac;
use os_types::OsTypes;
use parse::{parse_long_list, Record};
use serde::Serialize;
use std::cell::OnceCell;
use version::VersionInfo;

/// A network interface on the host computer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostNic {
    /// Interface name; use it as a bridged NIC's `net_name`.
    pub name: String,
    /// `0.0.0.0` when the interface is down.
    pub ip: Option<String>,
    pub netmask: Option<String>,
    /// Twelve uppercase hex digits.
    pub mac: Option<String>,
}

impl HostNic {
    fn from_record(record: &Record) -> Option<Self> {
        Some(HostNic {
            name: record.get("Name")?.clone(),
            ip: record.get("IPAddress").cloned(),
            netmask: record.get("NetworkMask").cloned(),
            mac: record.get("HardwareAddress").map(|m| normalize_mac(m)),
        })
    }
}

/// Handle on the VBoxManage tool.
///
/// Every operation is one blocking subprocess call. The caches live as long
/// as the context and are only refreshed through the `reset_*` /
/// `invalidate_*` methods. Not meant to be shared between threads.
pub struct VirtualBox {
    program: String,
    runner: Box<dyn CommandRunner>,
    version: OnceCell<VersionInfo>,
    os_types: OnceCell<OsTypes>,
    host_nics: OnceCell<Vec<HostNic>>,
}

impl VirtualBox {
    /// Context that runs `program` as a real subprocess.
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, SystemRunner)
    }

    /// Context for the VBoxManage binary picked from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let program = locate_vboxmanage(settings)?;
        Ok(Self::new(program.to_string_lossy()))
    }

    pub fn with_runner(program: impl Into<String>, runner: impl CommandRunner + 'static) -> Self {
        VirtualBox {
            program: program.into(),
            runner: Box::new(runner),
            version: OnceCell::new(),
            os_types: OnceCell::new(),
            host_nics: OnceCell::new(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs VBoxManage with `args`; a non-zero exit status is returned as data.
    pub fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(args.iter().map(|a| a.as_ref().to_string()));

        let result = self.runner.run(&argv)?;
        tracing::debug!(?argv, status = result.status, "VBoxManage finished");
        Ok(result)
    }

    /// Runs VBoxManage with `args`, failing with [`Error::Command`] on a
    /// non-zero exit status. Returns the output.
    pub fn run_checked<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        self.run(args)?.into_checked()
    }

    /// Runs a `list --long <kind>` query and splits it into records.
    pub(crate) fn list_long(&self, kind: &str) -> Result<Vec<Record>> {
        let output = self.run_checked(&["--nologo", "list", "--long", kind])?;
        Ok(parse_long_list(&output))
    }

    /// Information about the installed VirtualBox package.
    pub fn version(&self) -> Result<&VersionInfo> {
        if let Some(info) = self.version.get() {
            return Ok(info);
        }
        let result = self.run(&["--version"])?;
        let info = if result.success() {
            VersionInfo::parse(&result.output)
        } else {
            VersionInfo::default()
        };
        Ok(self.version.get_or_init(|| info))
    }

    /// True if the installed VirtualBox is the open-source edition.
    pub fn is_ose(&self) -> Result<bool> {
        match &self.version()?.edition {
            Some(edition) => Ok(edition == "OSE"),
            None => Err(Error::NotInstalled),
        }
    }

    pub fn reset_version_info(&mut self) {
        self.version = OnceCell::new();
    }

    /// Guest OS types supported by the installation.
    pub fn os_types(&self) -> Result<&OsTypes> {
        if let Some(table) = self.os_types.get() {
            return Ok(table);
        }
        let output = self.run_checked(&["--nologo", "list", "--long", "ostypes"])?;
        let table = OsTypes::from_list(&output);
        Ok(self.os_types.get_or_init(|| table))
    }

    pub fn invalidate_os_types(&mut self) {
        self.os_types = OnceCell::new();
    }

    /// Network interfaces on the host computer.
    pub fn host_nics(&self) -> Result<&[HostNic]> {
        if let Some(nics) = self.host_nics.get() {
            return Ok(nics);
        }
        let nics: Vec<HostNic> = self
            .list_long("hostifs")?
            .iter()
            .filter_map(HostNic::from_record)
            .collect();
        Ok(self.host_nics.get_or_init(|| nics))
    }

    pub fn invalidate_host_nics(&mut self) {
        self.host_nics = OnceCell::new();
    }
}
