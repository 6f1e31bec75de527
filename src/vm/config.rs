//! VM spec files

use super::disk::Disk;
use super::io_bus::IoBus;
use super::nic::{normalize_mac, random_mac, Nic, NicChip, MAX_NICS};
use super::Vm;
use crate::config::schema::{DiskSpec, IoBusSpec, Meta, NicSpec, VmSpec, SPEC_VERSION};
use crate::error::{Error, Result};
use crate::utils::paths::resolve_under_root;
use crate::utils::system::now_utc;
use std::fs::File;
use std::path::Path;

/// Save a VM spec to file
pub fn save_spec(spec: &VmSpec, path: &Path) -> Result<()> {
    let f = File::create(path)?;
    serde_json::to_writer_pretty(f, spec)?;
    Ok(())
}

/// Load a VM spec from file
pub fn load_spec(path: &Path) -> Result<VmSpec> {
    let f = File::open(path)?;
    let spec: VmSpec = serde_json::from_reader(f)?;
    if spec.meta.version > SPEC_VERSION {
        return Err(Error::InvalidConfig(format!(
            "{} uses spec version {}, newer than {SPEC_VERSION}",
            path.display(),
            spec.meta.version
        )));
    }
    Ok(spec)
}

impl Vm {
    /// Builds a VM from a spec. Relative disk paths resolve against `base_dir`.
    pub fn from_spec(spec: &VmSpec, base_dir: &Path) -> Result<Vm> {
        let mut vm = match &spec.uid {
            Some(uid) => Vm::with_uid(uid.clone()),
            None => Vm::new(),
        };
        if let Some(name) = &spec.name {
            vm.name = name.clone();
        }
        vm.board = spec.board.clone();
        vm.gui = spec.gui.unwrap_or(false);

        for nic in &spec.nics {
            let slot = match nic.slot {
                Some(slot) => slot,
                None => vm.nics.iter().position(Option::is_none).map_or(MAX_NICS + 1, |i| i + 1),
            };
            if slot == 0 || slot > MAX_NICS {
                return Err(Error::InvalidConfig(format!(
                    "NIC slot {slot} is outside 1..={MAX_NICS}"
                )));
            }
            if vm.nics[slot - 1].is_some() {
                return Err(Error::InvalidConfig(format!("NIC slot {slot} is used twice")));
            }
            vm.nics[slot - 1] = Some(nic_from_spec(nic));
        }

        for bus_spec in &spec.io_buses {
            vm.io_buses.push(io_bus_from_spec(bus_spec, base_dir)?);
        }
        Ok(vm)
    }

    /// Spec describing this VM, stamped with the current time.
    pub fn to_spec(&self) -> VmSpec {
        VmSpec {
            meta: Meta {
                version: SPEC_VERSION,
                generated: now_utc(),
            },
            uid: Some(self.uid.clone()),
            name: Some(self.name.clone()),
            board: self.board.clone(),
            nics: self
                .nics
                .iter()
                .enumerate()
                .filter_map(|(i, nic)| {
                    let nic = nic.as_ref()?;
                    Some(NicSpec {
                        slot: Some(i + 1),
                        mode: nic.mode,
                        chip: Some(nic.chip),
                        net_name: nic.net_name.clone(),
                        mac: Some(nic.mac.clone()),
                        trace_file: nic.trace_file.clone(),
                    })
                })
                .collect(),
            io_buses: self
                .io_buses
                .iter()
                .map(|bus| IoBusSpec {
                    name: Some(bus.name.clone()),
                    bus: Some(bus.bus),
                    chip: Some(bus.chip),
                    max_ports: Some(bus.max_ports),
                    bootable: Some(bus.bootable),
                    no_cache: Some(bus.no_cache),
                    disks: bus
                        .disks
                        .iter()
                        .map(|(&(port, device), disk)| DiskSpec {
                            file: disk.file.clone(),
                            format: Some(disk.format),
                            media: Some(disk.media),
                            port: Some(port),
                            device: Some(device),
                        })
                        .collect(),
                })
                .collect(),
            gui: Some(self.gui),
        }
    }
}

fn nic_from_spec(spec: &NicSpec) -> Nic {
    Nic {
        mode: spec.mode,
        chip: spec.chip.unwrap_or_else(|| NicChip::default_for(spec.mode)),
        net_name: spec.net_name.clone(),
        mac: spec.mac.as_deref().map_or_else(random_mac, normalize_mac),
        trace_file: spec.trace_file.clone(),
    }
}

fn io_bus_from_spec(spec: &IoBusSpec, base_dir: &Path) -> Result<IoBus> {
    let mut bus = IoBus::resolve(spec.bus, spec.chip)?;
    if let Some(name) = &spec.name {
        bus.name = name.clone();
    }
    if let Some(max_ports) = spec.max_ports {
        bus.max_ports = max_ports;
    }
    if let Some(bootable) = spec.bootable {
        bus.bootable = bootable;
    }
    if let Some(no_cache) = spec.no_cache {
        bus.no_cache = no_cache;
    }

    for disk_spec in &spec.disks {
        let file = resolve_under_root(base_dir, &disk_spec.file);
        let disk = Disk::with_kind(file, disk_spec.format, disk_spec.media)?;
        match disk_spec.port {
            Some(port) => bus.attach_at(disk, port, disk_spec.device.unwrap_or(0))?,
            None => {
                bus.attach(disk)?;
            }
        }
    }
    Ok(bus)
}
