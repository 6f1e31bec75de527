//! VM creation functionality

use super::config::load_spec;
use super::disk::Disk;
use super::io_bus::{BusKind, IoBus};
use super::nic::{Nic, NicMode};
use super::Vm;
use crate::error::{Error, Result};
use crate::vbox::VirtualBox;
use std::path::{Path, PathBuf};

/// VM creation parameters
#[derive(Debug, Clone, Default)]
pub struct CreateParams {
    pub name: String,
    pub cpus: Option<u32>,
    /// RAM, in megabytes.
    pub ram: Option<u32>,
    /// Video RAM, in megabytes.
    pub vram: Option<u32>,
    /// Guest OS symbol, e.g. `linux26`.
    pub os: Option<String>,
    /// `<mode>[:<network>]` entries, filling the free NIC slots in order.
    pub nics: Vec<String>,
    /// Images attached to the SATA controller.
    pub disks: Vec<PathBuf>,
    /// Spec file providing everything not given above.
    pub spec: Option<PathBuf>,
    pub start: bool,
    pub gui: bool,
}

/// Parses a `<mode>[:<network>]` NIC description, e.g. `host:vboxnet0`.
pub fn parse_nic(arg: &str) -> Result<Nic> {
    let (mode, net) = match arg.split_once(':') {
        Some((mode, net)) => (mode, Some(net)),
        None => (arg, None),
    };
    let mode: NicMode = mode.parse()?;
    Ok(match net {
        Some(net) if !net.is_empty() => Nic::attached(mode, net),
        _ => Nic::new(mode),
    })
}

/// VM Creator
pub struct VmCreator;

impl VmCreator {
    /// Builds the VM described by `params` without touching VirtualBox.
    pub fn build_vm(params: &CreateParams) -> Result<Vm> {
        let mut vm = match &params.spec {
            Some(path) => {
                let spec = load_spec(path)?;
                let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
                Vm::from_spec(&spec, base_dir)?
            }
            None => Vm::new(),
        };

        vm.name = params.name.clone();
        vm.gui = vm.gui || params.gui;
        if let Some(cpus) = params.cpus {
            vm.board.cpus = cpus;
        }
        if let Some(ram) = params.ram {
            vm.board.ram = ram;
        }
        if let Some(vram) = params.vram {
            vm.board.video_ram = vram;
        }
        if let Some(os) = &params.os {
            vm.board.os = os.clone();
        }

        for arg in &params.nics {
            let nic = parse_nic(arg)?;
            let slot = vm
                .nics
                .iter_mut()
                .find(|slot| slot.is_none())
                .ok_or_else(|| Error::InvalidConfig(format!("no free NIC slot for {arg}")))?;
            *slot = Some(nic);
        }
        if vm.nics.iter().all(Option::is_none) {
            vm.nics[0] = Some(Nic::new(NicMode::Nat));
        }

        if !params.disks.is_empty() {
            let name = BusKind::Sata.default_name();
            if vm.io_bus(&name).is_none() {
                vm.io_buses.push(IoBus::new(BusKind::Sata));
            }
            let Some(sata) = vm.io_bus_mut(&name) else {
                return Err(Error::InvalidConfig(format!("missing {name}")));
            };
            for file in &params.disks {
                sata.attach(Disk::new(file)?)?;
            }
        }

        Ok(vm)
    }

    /// Create and register a new VM, starting it if asked to
    pub fn create_vm(vbox: &VirtualBox, params: &CreateParams) -> Result<Vm> {
        let vm = VmCreator::build_vm(params)?;
        vm.register(vbox)?;
        if params.start {
            vm.start(vbox)?;
        }
        Ok(vm)
    }
}
