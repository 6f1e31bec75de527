//! Storage controllers and the disks attached to them

use super::disk::Disk;
use crate::error::{Error, Result};
use crate::vbox::parse::{number, on_off, Record};
use crate::vbox::VirtualBox;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The kind of bus a controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    Ide,
    Sata,
    Scsi,
    Sas,
    Floppy,
}

impl BusKind {
    fn as_str(self) -> &'static str {
        match self {
            BusKind::Ide => "ide",
            BusKind::Sata => "sata",
            BusKind::Scsi => "scsi",
            BusKind::Sas => "sas",
            BusKind::Floppy => "floppy",
        }
    }

    /// Chipset used when only the bus is known.
    pub fn default_chip(self) -> BusChip {
        match self {
            BusKind::Ide => BusChip::Piix4,
            BusKind::Sata => BusChip::Ahci,
            BusKind::Scsi => BusChip::LsiLogic,
            BusKind::Sas => BusChip::LsiLogicSas,
            BusKind::Floppy => BusChip::I82078,
        }
    }

    /// Name VirtualBox gives a controller on this bus.
    pub fn default_name(self) -> String {
        match self {
            BusKind::Floppy => "Floppy Controller".to_string(),
            other => format!("{} Controller", other.as_str().to_uppercase()),
        }
    }

    pub fn default_max_ports(self) -> u32 {
        match self {
            BusKind::Sata => 30,
            BusKind::Sas | BusKind::Scsi => 16,
            BusKind::Ide => 2,
            BusKind::Floppy => 1,
        }
    }
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ide" => Ok(BusKind::Ide),
            "sata" => Ok(BusKind::Sata),
            "scsi" => Ok(BusKind::Scsi),
            "sas" => Ok(BusKind::Sas),
            "floppy" => Ok(BusKind::Floppy),
            other => Err(Error::invalid("IO bus", other)),
        }
    }
}

/// Storage controller chipset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusChip {
    Piix3,
    Piix4,
    Ich6,
    Ahci,
    LsiLogic,
    BusLogic,
    LsiLogicSas,
    I82078,
}

const CHIP_NAMES: [(BusChip, &str, &str); 8] = [
    (BusChip::Piix3, "piix3", "PIIX3"),
    (BusChip::Piix4, "piix4", "PIIX4"),
    (BusChip::Ich6, "ich6", "ICH6"),
    (BusChip::Ahci, "ahci", "IntelAhci"),
    (BusChip::LsiLogic, "lsi_logic", "LsiLogic"),
    (BusChip::BusLogic, "bus_logic", "BusLogic"),
    (BusChip::LsiLogicSas, "lsi_logic_sas", "LSILogicSAS"),
    (BusChip::I82078, "i82078", "I82078"),
];

impl BusChip {
    /// The bus a chipset implies.
    pub fn bus(self) -> BusKind {
        match self {
            BusChip::Piix3 | BusChip::Piix4 | BusChip::Ich6 => BusKind::Ide,
            BusChip::Ahci => BusKind::Sata,
            BusChip::LsiLogic | BusChip::BusLogic => BusKind::Scsi,
            BusChip::LsiLogicSas => BusKind::Sas,
            BusChip::I82078 => BusKind::Floppy,
        }
    }

    fn tool_name(self) -> &'static str {
        CHIP_NAMES
            .iter()
            .find(|(chip, _, _)| *chip == self)
            .map_or("", |(_, _, name)| *name)
    }

    fn from_tool_name(s: &str) -> Option<Self> {
        CHIP_NAMES
            .iter()
            .find(|(_, _, name)| *name == s)
            .map(|(chip, _, _)| *chip)
    }
}

impl FromStr for BusChip {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CHIP_NAMES
            .iter()
            .find(|(_, symbol, _)| *symbol == s)
            .map(|(chip, _, _)| *chip)
            .ok_or_else(|| Error::invalid("IO bus chipset", s))
    }
}

/// One storage controller in a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoBus {
    /// Unique within a VM.
    pub name: String,
    pub bus: BusKind,
    pub chip: BusChip,
    /// Ports available on the bus.
    pub max_ports: u32,
    /// Whether the BIOS may boot from this controller.
    pub bootable: bool,
    /// Bypass the host OS cache for this controller's I/O.
    pub no_cache: bool,
    /// Attached media, keyed by (port, device).
    #[serde(serialize_with = "serialize_attachments")]
    pub disks: BTreeMap<(u32, u32), Disk>,
}

#[derive(Serialize)]
struct AttachmentRef<'a> {
    port: u32,
    device: u32,
    #[serde(flatten)]
    disk: &'a Disk,
}

fn serialize_attachments<S: Serializer>(
    disks: &BTreeMap<(u32, u32), Disk>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(
        disks
            .iter()
            .map(|(&(port, device), disk)| AttachmentRef { port, device, disk }),
    )
}

impl IoBus {
    /// Controller on `bus` with every other setting defaulted.
    pub fn new(bus: BusKind) -> Self {
        IoBus::with_parts(bus, bus.default_chip())
    }

    /// Controller using `chip`; the bus follows from the chipset.
    pub fn with_chip(chip: BusChip) -> Self {
        IoBus::with_parts(chip.bus(), chip)
    }

    /// Fills in whichever of `bus` / `chip` is missing from the other.
    ///
    /// Fails if neither is given, or if they disagree.
    pub fn resolve(bus: Option<BusKind>, chip: Option<BusChip>) -> Result<Self> {
        match (bus, chip) {
            (Some(bus), None) => Ok(IoBus::new(bus)),
            (None, Some(chip)) => Ok(IoBus::with_chip(chip)),
            (Some(bus), Some(chip)) if chip.bus() == bus => Ok(IoBus::with_chip(chip)),
            (Some(bus), Some(chip)) => Err(Error::InvalidConfig(format!(
                "chipset {} does not drive a {bus} bus",
                chip.tool_name()
            ))),
            (None, None) => Err(Error::InvalidConfig(
                "an IO bus needs a bus type or a chipset".to_string(),
            )),
        }
    }

    fn with_parts(bus: BusKind, chip: BusChip) -> Self {
        IoBus {
            name: bus.default_name(),
            bus,
            chip,
            max_ports: bus.default_max_ports(),
            bootable: true,
            no_cache: false,
            disks: BTreeMap::new(),
        }
    }

    /// `storagectl` arguments that add this controller to a VM.
    pub fn to_params(&self) -> Vec<String> {
        vec![
            "--name".to_string(),
            self.name.clone(),
            "--add".to_string(),
            self.bus.to_string(),
            "--controller".to_string(),
            self.chip.tool_name().to_string(),
            "--portcount".to_string(),
            self.max_ports.to_string(),
            "--hostiocache".to_string(),
            on_off(!self.no_cache).to_string(),
            "--bootable".to_string(),
            on_off(self.bootable).to_string(),
        ]
    }

    /// Decodes controller `index` of `showvminfo --machinereadable` output,
    /// together with the media attached to it.
    pub fn from_params(params: &Record, index: u32) -> Option<IoBus> {
        let name = params.get(&format!("storagecontrollername{index}"))?;
        let chip_name = params.get(&format!("storagecontrollertype{index}"))?;
        let Some(chip) = BusChip::from_tool_name(chip_name) else {
            tracing::warn!(controller = %name, chip = %chip_name, "skipping unsupported storage controller");
            return None;
        };

        let mut bus = IoBus::with_chip(chip);
        bus.name = name.clone();
        if let Some(ports) = number(params, &format!("storagecontrollerportcount{index}"))
            .or_else(|| number(params, &format!("storagecontrollermaxportcount{index}")))
        {
            bus.max_ports = ports;
        }
        bus.bootable = params
            .get(&format!("storagecontrollerbootable{index}"))
            .map_or(true, |v| v == "on");
        bus.no_cache = params
            .get(&format!("storagecontrollerhostiocache{index}"))
            .is_some_and(|v| v == "off");

        let prefix = format!("{name}-");
        for (key, file) in params.range(prefix.clone()..) {
            let Some(slot) = key.strip_prefix(&prefix) else {
                break;
            };
            let Some((port, device)) = parse_slot(slot) else {
                continue;
            };
            if file == "none" || file == "emptydrive" {
                continue;
            }
            let Ok(mut disk) = Disk::new(file) else {
                continue;
            };
            disk.uid = params.get(&format!("{name}-ImageUUID-{port}-{device}")).cloned();
            bus.disks.insert((port, device), disk);
        }

        Some(bus)
    }

    /// Port for the next attachment: 0 on an empty bus, otherwise the first
    /// unused port above the lowest used one.
    pub fn first_free_port(&self) -> Result<u32> {
        let Some(&(lowest, _)) = self.disks.keys().next() else {
            return Ok(0);
        };
        let mut port = lowest + 1;
        while self.disks.keys().any(|&(p, _)| p == port) {
            port += 1;
        }
        if port >= self.max_ports {
            return Err(Error::InvalidConfig(format!(
                "no free port on {} ({} ports)",
                self.name, self.max_ports
            )));
        }
        Ok(port)
    }

    /// Attaches `disk` at device 0 of the first free port.
    pub fn attach(&mut self, disk: Disk) -> Result<(u32, u32)> {
        let slot = (self.first_free_port()?, 0);
        self.disks.insert(slot, disk);
        Ok(slot)
    }

    /// Attaches `disk` at an explicit address.
    pub fn attach_at(&mut self, disk: Disk, port: u32, device: u32) -> Result<()> {
        if port >= self.max_ports {
            return Err(Error::InvalidConfig(format!(
                "port {port} is out of range for {}",
                self.name
            )));
        }
        if self.disks.contains_key(&(port, device)) {
            return Err(Error::InvalidConfig(format!(
                "{} already has a disk at port {port}, device {device}",
                self.name
            )));
        }
        self.disks.insert((port, device), disk);
        Ok(())
    }

    /// Adds this controller to a registered VM and attaches its disks.
    pub fn add_to(&self, vbox: &VirtualBox, vm_uid: &str) -> Result<()> {
        let mut args = vec!["storagectl".to_string(), vm_uid.to_string()];
        args.extend(self.to_params());
        vbox.run_checked(&args)?;

        for (&(port, device), disk) in &self.disks {
            disk.attach_to(vbox, vm_uid, &self.name, port, device)?;
        }
        Ok(())
    }

    /// Removes this controller from a registered VM.
    pub fn remove_from(&self, vbox: &VirtualBox, vm_uid: &str) -> Result<()> {
        vbox.run_checked(&["storagectl", vm_uid, "--name", self.name.as_str(), "--remove"])?;
        Ok(())
    }
}

fn parse_slot(slot: &str) -> Option<(u32, u32)> {
    let (port, device) = slot.split_once('-')?;
    Some((port.parse().ok()?, device.parse().ok()?))
}
