//! Virtual machines and their lifecycle
//!
//! A [`Vm`] is an in-memory description. It only exists in VirtualBox after
//! [`Vm::register`], which creates the machine and pushes the whole
//! configuration; [`Vm::pull_config`] reads it back.

pub mod board;
pub mod config;
pub mod creator;
pub mod disk;
pub mod io_bus;
pub mod manager;
pub mod nic;

use crate::error::{Error, Result};
use crate::vbox::parse::{max_index, parse_machine_readable};
use crate::vbox::VirtualBox;
use board::Board;
use io_bus::IoBus;
use nic::{Nic, MAX_NICS};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Actions accepted by [`Vm::control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ControlAction {
    /// Hard power-off, like pulling the power cord.
    Kill,
    /// ACPI power button press.
    PowerButton,
    /// Non-maskable interrupt.
    Nmi,
    Pause,
    Resume,
    Reset,
}

impl ControlAction {
    fn tool_name(self) -> &'static str {
        match self {
            ControlAction::Kill => "poweroff",
            ControlAction::PowerButton => "acpipowerbutton",
            ControlAction::Nmi => "injectnmi",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Reset => "reset",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// One line of `list vms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmSummary {
    pub name: String,
    pub uid: String,
}

impl FromStr for VmSummary {
    type Err = Error;

    /// Parses `"name" {uid}`.
    fn from_str(line: &str) -> Result<Self> {
        let bad = || Error::Parse(format!("unexpected VM list line: {line}"));
        let open = line.rfind('{').ok_or_else(bad)?;
        let uid = line[open + 1..].trim_end().strip_suffix('}').ok_or_else(bad)?;
        let name = line[..open].trim();
        let name = name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(name);
        Ok(VmSummary {
            name: name.to_string(),
            uid: uid.to_string(),
        })
    }
}

/// A VirtualBox virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vm {
    /// UUID the VM is registered under.
    pub uid: String,
    pub name: String,
    pub board: Board,
    /// NIC slots 1 to 8; `None` is an empty slot.
    pub nics: [Option<Nic>; MAX_NICS],
    pub io_buses: Vec<IoBus>,
    /// Show the VM's screen when it starts, instead of running headless.
    pub gui: bool,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::with_uid(uuid::Uuid::new_v4().to_string())
    }
}

impl Vm {
    /// A new VM with a fresh UUID. Nothing is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A VM description for `uid`, named after it.
    pub fn with_uid(uid: impl Into<String>) -> Self {
        let uid = uid.into();
        Vm {
            name: format!("vbx_{}", uid.replace('-', "")),
            uid,
            board: Board::default(),
            nics: Default::default(),
            io_buses: Vec::new(),
            gui: false,
        }
    }

    /// Reads a registered VM's configuration.
    pub fn load(vbox: &VirtualBox, uid: &str) -> Result<Vm> {
        let mut vm = Vm::with_uid(uid);
        vm.pull_config(vbox)?;
        Ok(vm)
    }

    pub fn io_bus(&self, name: &str) -> Option<&IoBus> {
        self.io_buses.iter().find(|bus| bus.name == name)
    }

    pub fn io_bus_mut(&mut self, name: &str) -> Option<&mut IoBus> {
        self.io_buses.iter_mut().find(|bus| bus.name == name)
    }

    pub fn is_registered(&self, vbox: &VirtualBox) -> Result<bool> {
        Ok(Vm::registered_uids(vbox)?.contains(&self.uid))
    }

    /// True if the VM is running.
    pub fn is_live(&self, vbox: &VirtualBox) -> Result<bool> {
        Ok(Vm::started_uids(vbox)?.contains(&self.uid))
    }

    /// Creates this VM in VirtualBox and pushes its whole configuration.
    ///
    /// An existing registration under the same UUID is replaced. If any step
    /// after `createvm` fails, the VM is unregistered again.
    pub fn register(&self, vbox: &VirtualBox) -> Result<()> {
        let modify = self.modifyvm_args(vbox)?;
        self.check_io_buses()?;

        if self.is_registered(vbox)? {
            self.unregister(vbox)?;
        }
        vbox.run_checked(&[
            "--nologo",
            "createvm",
            "--name",
            self.name.as_str(),
            "--uuid",
            self.uid.as_str(),
            "--register",
        ])?;

        let configured = vbox
            .run_checked(&modify)
            .and_then(|_| self.add_io_buses(vbox));
        if let Err(err) = configured {
            tracing::warn!(uid = %self.uid, error = %err, "configuring VM failed, unregistering it");
            self.unregister(vbox)?;
            return Err(err);
        }

        tracing::info!(uid = %self.uid, name = %self.name, "VM registered");
        Ok(())
    }

    /// Removes the VM from VirtualBox's database, keeping its disk images.
    ///
    /// Returns false if the VM was not registered. A refusal while the VM is
    /// still registered is an [`Error::Command`].
    pub fn unregister(&self, vbox: &VirtualBox) -> Result<bool> {
        self.unregister_with(vbox, &[])
    }

    /// Unregisters the VM and deletes its files, attached disks included.
    pub fn delete(&self, vbox: &VirtualBox) -> Result<bool> {
        self.unregister_with(vbox, &["--delete"])
    }

    fn unregister_with(&self, vbox: &VirtualBox, extra: &[&str]) -> Result<bool> {
        let mut args = vec!["unregistervm", self.uid.as_str()];
        args.extend_from_slice(extra);
        let result = vbox.run(&args)?;
        if result.success() {
            tracing::info!(uid = %self.uid, "VM unregistered");
            return Ok(true);
        }
        if self.is_registered(vbox)? {
            tracing::warn!(uid = %self.uid, status = result.status, "unregistervm failed");
            return result.into_checked().map(|_| true);
        }
        tracing::debug!(uid = %self.uid, "VM was not registered");
        Ok(false)
    }

    /// Starts the VM, registering it first if needed.
    pub fn start(&self, vbox: &VirtualBox) -> Result<()> {
        if !self.is_registered(vbox)? {
            self.register(vbox)?;
        }
        let kind = if self.gui { "gui" } else { "headless" };
        vbox.run_checked(&["--nologo", "startvm", self.uid.as_str(), "--type", kind])?;
        tracing::info!(uid = %self.uid, kind, "VM started");
        Ok(())
    }

    /// Powers the VM off without warning the guest.
    pub fn stop(&self, vbox: &VirtualBox) -> Result<()> {
        self.control(vbox, ControlAction::Kill)
    }

    pub fn control(&self, vbox: &VirtualBox, action: ControlAction) -> Result<()> {
        vbox.run_checked(&["--nologo", "controlvm", self.uid.as_str(), action.tool_name()])?;
        tracing::info!(uid = %self.uid, %action, "VM control");
        Ok(())
    }

    /// Sends the board and NIC settings to VirtualBox.
    pub fn push_config(&self, vbox: &VirtualBox) -> Result<()> {
        let args = self.modifyvm_args(vbox)?;
        vbox.run_checked(&args)?;
        Ok(())
    }

    /// Replaces this description with what VirtualBox has for `uid`.
    pub fn pull_config(&mut self, vbox: &VirtualBox) -> Result<()> {
        let output = vbox.run_checked(&[
            "--nologo",
            "showvminfo",
            "--machinereadable",
            self.uid.as_str(),
        ])?;
        let config = parse_machine_readable(&output);

        if let Some(name) = config.get("name") {
            self.name = name.clone();
        }
        if let Some(uid) = config.get("UUID") {
            self.uid = uid.clone();
        }
        self.board = Board::from_params(&config, vbox.os_types()?);

        self.nics = Default::default();
        let nic_count = max_index(&config, "nic").map_or(0, |n| n as usize);
        for slot in 1..=nic_count.min(MAX_NICS) {
            self.nics[slot - 1] = if Nic::slot_in_use(&config, slot) {
                Some(Nic::from_params(&config, slot)?)
            } else {
                None
            };
        }

        self.io_buses = match max_index(&config, "storagecontrollername") {
            Some(last) => (0..=last)
                .filter_map(|index| IoBus::from_params(&config, index))
                .collect(),
            None => Vec::new(),
        };
        Ok(())
    }

    /// UUIDs of every registered VM.
    pub fn registered_uids(vbox: &VirtualBox) -> Result<Vec<String>> {
        Ok(Vm::list(vbox)?.into_iter().map(|vm| vm.uid).collect())
    }

    /// UUIDs of every running VM.
    pub fn started_uids(vbox: &VirtualBox) -> Result<Vec<String>> {
        Ok(Vm::list_running(vbox)?.into_iter().map(|vm| vm.uid).collect())
    }

    pub fn list(vbox: &VirtualBox) -> Result<Vec<VmSummary>> {
        Vm::list_kind(vbox, "vms")
    }

    pub fn list_running(vbox: &VirtualBox) -> Result<Vec<VmSummary>> {
        Vm::list_kind(vbox, "runningvms")
    }

    fn list_kind(vbox: &VirtualBox, kind: &str) -> Result<Vec<VmSummary>> {
        vbox.run_checked(&["--nologo", "list", kind])?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::parse)
            .collect()
    }

    fn modifyvm_args(&self, vbox: &VirtualBox) -> Result<Vec<String>> {
        let mut args = vec!["modifyvm".to_string(), self.uid.clone()];
        args.extend(self.board.to_params(vbox.os_types()?)?);
        for (index, nic) in self.nics.iter().enumerate() {
            let slot = index + 1;
            match nic {
                Some(nic) => args.extend(nic.to_params(slot)?),
                None => args.extend(Nic::empty_slot_params(slot)),
            }
        }
        Ok(args)
    }

    fn check_io_buses(&self) -> Result<()> {
        let mut names = HashSet::new();
        for bus in &self.io_buses {
            if !names.insert(bus.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "two IO buses are named {:?}",
                    bus.name
                )));
            }
        }
        Ok(())
    }

    fn add_io_buses(&self, vbox: &VirtualBox) -> Result<()> {
        for bus in &self.io_buses {
            bus.add_to(vbox, &self.uid)?;
        }
        Ok(())
    }
}
