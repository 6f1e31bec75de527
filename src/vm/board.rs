//! General VM hardware settings (the virtual motherboard)

use crate::error::{Error, Result};
use crate::vbox::os_types::OsTypes;
use crate::vbox::parse::{flag, number, on_off, Record};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of BIOS boot slots.
pub const BOOT_SLOTS: usize = 4;

/// A device the BIOS can boot from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootDevice {
    Floppy,
    Dvd,
    Disk,
    Net,
}

impl BootDevice {
    pub fn as_str(self) -> &'static str {
        match self {
            BootDevice::Floppy => "floppy",
            BootDevice::Dvd => "dvd",
            BootDevice::Disk => "disk",
            BootDevice::Net => "net",
        }
    }
}

impl FromStr for BootDevice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "floppy" => Ok(BootDevice::Floppy),
            "dvd" => Ok(BootDevice::Dvd),
            "disk" => Ok(BootDevice::Disk),
            "net" => Ok(BootDevice::Net),
            other => Err(Error::invalid("boot device", other)),
        }
    }
}

/// Whether the user may pick a boot device (F12) at boot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMenu {
    /// No override allowed.
    #[default]
    Disabled,
    /// F12 works, but no prompt is shown.
    MenuOnly,
    /// Prompt shown, F12 works.
    MessageAndMenu,
}

impl BootMenu {
    fn tool_name(self) -> &'static str {
        match self {
            BootMenu::Disabled => "disabled",
            BootMenu::MenuOnly => "menuonly",
            BootMenu::MessageAndMenu => "messageandmenu",
        }
    }

    fn from_tool_name(s: &str) -> Self {
        match s {
            "disabled" => BootMenu::Disabled,
            "menuonly" | "message" => BootMenu::MenuOnly,
            _ => BootMenu::MessageAndMenu,
        }
    }
}

/// Specification for a VM's motherboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Board {
    /// Number of CPU cores.
    pub cpus: u32,
    /// RAM, in megabytes.
    pub ram: u32,
    /// Video RAM, in megabytes.
    pub video_ram: u32,
    /// UUID presented to the guest OS.
    pub hardware_id: String,
    /// Guest OS symbol, as listed by [`OsTypes`] (e.g. `linux26`).
    pub os: String,
    /// 36-bit physical addressing.
    pub pae: bool,
    pub acpi: bool,
    /// Needed by 64-bit guests; slows virtualization down.
    pub io_apic: bool,
    /// Use VT-x / AMD-V.
    pub hardware_virtualization: bool,
    /// Only honoured when `hardware_virtualization` is on.
    pub nested_paging: bool,
    /// VPID; only honoured when `hardware_virtualization` is on.
    pub tagged_tlb: bool,
    /// Needs guest additions to have any effect.
    pub accelerate_3d: bool,
    /// Boot with EFI instead of BIOS.
    pub efi: bool,
    pub bios_logo_fade_in: bool,
    pub bios_logo_fade_out: bool,
    /// Milliseconds the BIOS logo stays on screen.
    pub bios_logo_display_time: u32,
    pub bios_boot_menu: BootMenu,
    /// Boot device search order; duplicates are dropped when encoding.
    pub boot_order: Vec<BootDevice>,
}

impl Default for Board {
    fn default() -> Self {
        Board {
            cpus: 1,
            ram: 512,
            video_ram: 18,
            hardware_id: uuid::Uuid::new_v4().to_string(),
            os: "other".to_string(),
            pae: false,
            acpi: true,
            io_apic: false,
            hardware_virtualization: true,
            nested_paging: true,
            tagged_tlb: true,
            accelerate_3d: false,
            efi: false,
            bios_logo_fade_in: false,
            bios_logo_fade_out: false,
            bios_logo_display_time: 0,
            bios_boot_menu: BootMenu::Disabled,
            boot_order: vec![BootDevice::Disk, BootDevice::Net, BootDevice::Dvd],
        }
    }
}

/// First occurrence of each device, in order, capped at [`BOOT_SLOTS`].
pub fn unique_boot_order(order: &[BootDevice]) -> Vec<BootDevice> {
    let mut unique = Vec::with_capacity(BOOT_SLOTS);
    for device in order {
        if !unique.contains(device) {
            unique.push(*device);
        }
    }
    unique.truncate(BOOT_SLOTS);
    unique
}

impl Board {
    /// `modifyvm` arguments for these settings.
    ///
    /// Fails before anything runs if `os` is not in `os_types`.
    pub fn to_params(&self, os_types: &OsTypes) -> Result<Vec<String>> {
        let hw = self.hardware_virtualization;
        let mut params: Vec<String> = Vec::new();
        let mut push = |flag: &str, value: &str| {
            params.push(format!("--{flag}"));
            params.push(value.to_string());
        };

        push("cpus", &self.cpus.to_string());
        push("memory", &self.ram.to_string());
        push("vram", &self.video_ram.to_string());
        push("hardwareuuid", &self.hardware_id);
        push("ostype", os_types.tool_id(&self.os)?);

        push("pae", on_off(self.pae));
        push("acpi", on_off(self.acpi));
        push("ioapic", on_off(self.io_apic));

        push("hwvirtex", on_off(hw));
        push("nestedpaging", on_off(hw && self.nested_paging));
        push("vtxvpid", on_off(hw && self.tagged_tlb));
        push("accelerate3d", on_off(self.accelerate_3d));

        push("firmware", if self.efi { "efi" } else { "bios" });
        push("bioslogofadein", on_off(self.bios_logo_fade_in));
        push("bioslogofadeout", on_off(self.bios_logo_fade_out));
        push("bioslogodisplaytime", &self.bios_logo_display_time.to_string());
        push("biosbootmenu", self.bios_boot_menu.tool_name());

        let order = unique_boot_order(&self.boot_order);
        for slot in 0..BOOT_SLOTS {
            let device = order.get(slot).map_or("none", |d| d.as_str());
            push(&format!("boot{}", slot + 1), device);
        }

        Ok(params)
    }

    /// Decodes `showvminfo --machinereadable` output.
    ///
    /// Keys that are missing keep their default value.
    pub fn from_params(params: &Record, os_types: &OsTypes) -> Board {
        let mut board = Board::default();

        if let Some(v) = number(params, "cpus") {
            board.cpus = v;
        }
        if let Some(v) = number(params, "memory") {
            board.ram = v;
        }
        if let Some(v) = number(params, "vram") {
            board.video_ram = v;
        }
        if let Some(v) = params.get("hardwareuuid") {
            board.hardware_id = v.clone();
        }
        if let Some(v) = params.get("ostype") {
            board.os = os_types
                .symbol(v)
                .map(str::to_string)
                .unwrap_or_else(|| v.to_lowercase());
        }

        let flags: [(&str, &mut bool); 9] = [
            ("pae", &mut board.pae),
            ("acpi", &mut board.acpi),
            ("ioapic", &mut board.io_apic),
            ("hwvirtex", &mut board.hardware_virtualization),
            ("nestedpaging", &mut board.nested_paging),
            ("vtxvpid", &mut board.tagged_tlb),
            ("accelerate3d", &mut board.accelerate_3d),
            ("bioslogofadein", &mut board.bios_logo_fade_in),
            ("bioslogofadeout", &mut board.bios_logo_fade_out),
        ];
        for (key, field) in flags {
            if let Some(v) = flag(params, key) {
                *field = v;
            }
        }

        if let Some(firmware) = params.get("firmware") {
            board.efi = firmware.to_ascii_lowercase().starts_with("efi");
        }
        if let Some(v) = number(params, "bioslogodisplaytime") {
            board.bios_logo_display_time = v;
        }
        if let Some(v) = params.get("bootmenu") {
            board.bios_boot_menu = BootMenu::from_tool_name(v);
        }

        let slots: Vec<&String> = (1..=BOOT_SLOTS)
            .filter_map(|i| params.get(&format!("boot{i}")))
            .collect();
        if !slots.is_empty() {
            board.boot_order = slots
                .into_iter()
                .filter_map(|d| d.parse().ok())
                .collect();
        }

        board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::OSTYPES;
    use crate::vbox::parse::parse_machine_readable;

    fn value_of<'a>(params: &'a [String], flag: &str) -> &'a str {
        let i = params.iter().position(|p| p == flag).unwrap();
        &params[i + 1]
    }

    #[test]
    fn defaults() {
        let board = Board::default();
        assert_eq!(board.cpus, 1);
        assert_eq!(board.ram, 512);
        assert_eq!(board.os, "other");
        assert!(board.acpi);
        assert_eq!(board.boot_order, vec![BootDevice::Disk, BootDevice::Net, BootDevice::Dvd]);
        assert_ne!(Board::default().hardware_id, board.hardware_id);
    }

    #[test]
    fn booleans_encode_as_on_off() {
        let table = OsTypes::from_list(OSTYPES);
        let params = Board::default().to_params(&table).unwrap();
        assert_eq!(value_of(&params, "--pae"), "off");
        assert_eq!(value_of(&params, "--acpi"), "on");
        assert_eq!(value_of(&params, "--firmware"), "bios");
        assert_eq!(value_of(&params, "--ostype"), "Other");
        assert_eq!(value_of(&params, "--biosbootmenu"), "disabled");
    }

    #[test]
    fn nested_flags_follow_hardware_virtualization() {
        let table = OsTypes::from_list(OSTYPES);
        let board = Board {
            hardware_virtualization: false,
            nested_paging: true,
            tagged_tlb: true,
            ..Board::default()
        };
        let params = board.to_params(&table).unwrap();
        assert_eq!(value_of(&params, "--hwvirtex"), "off");
        assert_eq!(value_of(&params, "--nestedpaging"), "off");
        assert_eq!(value_of(&params, "--vtxvpid"), "off");
    }

    #[test]
    fn boot_order_dedupes_and_pads() {
        let table = OsTypes::from_list(OSTYPES);
        let board = Board {
            boot_order: vec![BootDevice::Disk, BootDevice::Disk, BootDevice::Net],
            ..Board::default()
        };
        let params = board.to_params(&table).unwrap();
        assert_eq!(value_of(&params, "--boot1"), "disk");
        assert_eq!(value_of(&params, "--boot2"), "net");
        assert_eq!(value_of(&params, "--boot3"), "none");
        assert_eq!(value_of(&params, "--boot4"), "none");
    }

    #[test]
    fn unknown_os_fails_before_encoding() {
        let table = OsTypes::from_list(OSTYPES);
        let board = Board {
            os: "haiku".to_string(),
            ..Board::default()
        };
        assert!(matches!(
            board.to_params(&table),
            Err(Error::InvalidValue { kind: "OS type", .. })
        ));
    }

    #[test]
    fn decodes_machine_readable_output() {
        let table = OsTypes::from_list(OSTYPES);
        let record = parse_machine_readable(
            "cpus=2\nmemory=768\nvram=22\nostype=\"Fedora\"\nhardwareuuid=\"abc\"\npae=\"on\"\n\
             ioapic=\"on\"\nhwvirtex=\"on\"\nnestedpaging=\"off\"\nfirmware=\"EFI\"\nbootmenu=\"menuonly\"\n\
             boot1=\"dvd\"\nboot2=\"net\"\nboot3=\"disk\"\nboot4=\"none\"\n",
        );
        let board = Board::from_params(&record, &table);
        assert_eq!(board.cpus, 2);
        assert_eq!(board.ram, 768);
        assert_eq!(board.video_ram, 22);
        assert_eq!(board.os, "fedora");
        assert_eq!(board.hardware_id, "abc");
        assert!(board.pae);
        assert!(board.io_apic);
        assert!(!board.nested_paging);
        assert!(board.efi);
        assert_eq!(board.bios_boot_menu, BootMenu::MenuOnly);
        assert_eq!(board.boot_order, vec![BootDevice::Dvd, BootDevice::Net, BootDevice::Disk]);
    }

    #[test]
    fn missing_keys_keep_defaults() {
        let table = OsTypes::from_list(OSTYPES);
        let board = Board::from_params(&parse_machine_readable("cpus=4\n"), &table);
        assert_eq!(board.cpus, 4);
        assert_eq!(board.ram, 512);
        assert!(board.acpi);
        assert_eq!(board.boot_order.len(), 3);
    }

    #[test]
    fn partial_json_uses_defaults_and_rejects_unknown_keys() {
        let board: Board = serde_json::from_str(r#"{"cpus": 2, "boot_order": ["dvd", "disk"]}"#).unwrap();
        assert_eq!(board.cpus, 2);
        assert_eq!(board.ram, 512);
        assert_eq!(board.boot_order, vec![BootDevice::Dvd, BootDevice::Disk]);

        assert!(serde_json::from_str::<Board>(r#"{"cpu": 2}"#).is_err());
    }
}
