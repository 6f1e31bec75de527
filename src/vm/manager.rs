//! VM lifecycle management by name or UUID

use super::{ControlAction, Vm, VmSummary};
use crate::error::{Error, Result};
use crate::vbox::VirtualBox;
use std::io::{self, BufRead, Write};

/// VM Manager for lifecycle operations on registered VMs
pub struct VmManager<'a> {
    vbox: &'a VirtualBox,
}

impl<'a> VmManager<'a> {
    pub fn new(vbox: &'a VirtualBox) -> Self {
        Self { vbox }
    }

    /// Registered VMs, or only the running ones
    pub fn list(&self, running: bool) -> Result<Vec<VmSummary>> {
        if running {
            Vm::list_running(self.vbox)
        } else {
            Vm::list(self.vbox)
        }
    }

    /// Find a registered VM by name or UUID and read its configuration
    pub fn find(&self, name_or_uid: &str) -> Result<Vm> {
        let vms = Vm::list(self.vbox)?;
        let summary = vms
            .iter()
            .find(|vm| vm.uid == name_or_uid)
            .or_else(|| vms.iter().find(|vm| vm.name == name_or_uid))
            .ok_or_else(|| Error::VmNotFound(name_or_uid.to_string()))?;
        Vm::load(self.vbox, &summary.uid)
    }

    /// Start a VM, with a GUI window if `gui` is set
    pub fn start_vm(&self, name: &str, gui: bool) -> Result<Vm> {
        let mut vm = self.find(name)?;
        vm.gui = gui;
        vm.start(self.vbox)?;
        Ok(vm)
    }

    /// Power a VM off
    pub fn stop_vm(&self, name: &str) -> Result<Vm> {
        self.control_vm(name, ControlAction::Kill)
    }

    pub fn control_vm(&self, name: &str, action: ControlAction) -> Result<Vm> {
        let vm = self.find(name)?;
        vm.control(self.vbox, action)?;
        Ok(vm)
    }

    /// Delete a VM by name, asking for confirmation unless `force` is set.
    ///
    /// With `keep_disks` the VM is only unregistered. Returns false if the
    /// user cancelled.
    pub fn delete_vm(&self, name: &str, force: bool, keep_disks: bool) -> Result<bool> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        self.delete_vm_with(name, force, keep_disks, &mut input, &mut io::stdout())
    }

    fn delete_vm_with(
        &self,
        name: &str,
        force: bool,
        keep_disks: bool,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> Result<bool> {
        let vm = self.find(name)?;

        if vm.is_live(self.vbox)? {
            return Err(Error::InvalidConfig(format!(
                "cannot delete VM '{}': it is running. Stop it first with 'vboxctl vm stop {}'",
                vm.name, vm.name
            )));
        }

        if !force {
            writeln!(out, "About to delete VM '{}':", vm.name)?;
            writeln!(out, "  UUID: {}", vm.uid)?;
            for bus in &vm.io_buses {
                for disk in bus.disks.values() {
                    let fate = if keep_disks { "kept" } else { "deleted" };
                    writeln!(out, "  Disk ({fate}): {}", disk.file.display())?;
                }
            }
            writeln!(out)?;
            write!(out, "Are you sure you want to delete this VM? [y/N]: ")?;
            out.flush()?;

            let mut answer = String::new();
            input.read_line(&mut answer)?;
            if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                writeln!(out, "Deletion cancelled.")?;
                return Ok(false);
            }
        }

        let removed = if keep_disks {
            vm.unregister(self.vbox)?
        } else {
            vm.delete(self.vbox)?
        };
        if !removed {
            return Err(Error::VmNotFound(vm.name));
        }
        Ok(true)
    }
}
