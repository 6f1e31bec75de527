//! Settings and VM spec file schema definitions

use crate::net::dhcp::DhcpSpec;
use crate::vm::board::Board;
use crate::vm::disk::{DiskFormat, DiskMedia};
use crate::vm::io_bus::{BusChip, BusKind};
use crate::vm::nic::{NicChip, NicMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current VM spec file format version.
pub const SPEC_VERSION: u32 = 1;

/// Tool settings, read from `settings.json`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Explicit path to VBoxManage; searched for when unset.
    pub vboxmanage: Option<PathBuf>,
    /// Start VMs with a GUI window unless told otherwise.
    pub gui: bool,
    /// Log filter directive, such as `info` or `vboxctl=debug`.
    pub log: Option<String>,
}

/// VM spec file
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VmSpec {
    pub meta: Meta,
    /// Generated when unset.
    pub uid: Option<String>,
    /// Derived from the UID when unset.
    pub name: Option<String>,
    pub board: Board,
    pub nics: Vec<NicSpec>,
    pub io_buses: Vec<IoBusSpec>,
    pub gui: Option<bool>,
}

/// Spec file metadata
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Meta {
    pub version: u32,
    pub generated: String,
}

impl Default for Meta {
    fn default() -> Self {
        Meta {
            version: SPEC_VERSION,
            generated: String::new(),
        }
    }
}

/// One network card
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NicSpec {
    /// 1-based slot; the next free slot when unset.
    pub slot: Option<usize>,
    pub mode: NicMode,
    pub chip: Option<NicChip>,
    pub net_name: Option<String>,
    pub mac: Option<String>,
    pub trace_file: Option<PathBuf>,
}

/// One storage controller
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IoBusSpec {
    pub name: Option<String>,
    pub bus: Option<BusKind>,
    pub chip: Option<BusChip>,
    pub max_ports: Option<u32>,
    pub bootable: Option<bool>,
    pub no_cache: Option<bool>,
    pub disks: Vec<DiskSpec>,
}

/// A disk attached to a storage controller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DiskSpec {
    /// Relative paths are resolved against the spec file's directory.
    pub file: PathBuf,
    #[serde(default)]
    pub format: Option<DiskFormat>,
    #[serde(default)]
    pub media: Option<DiskMedia>,
    /// First free port when unset.
    #[serde(default)]
    pub port: Option<u32>,
    #[serde(default)]
    pub device: Option<u32>,
}

/// A host-only network with an optional DHCP server
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NetSpec {
    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub dhcp: Option<DhcpSpec>,
}
