//! Virtual network cards

use crate::error::{Error, Result};
use crate::vbox::parse::{on_off, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Number of NIC slots in a VM.
pub const MAX_NICS: usize = 8;

/// The kind of network emulation implemented on a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NicMode {
    /// VirtualBox's NAT engine, hiding the guest behind the host.
    #[default]
    Nat,
    /// Bypasses the host OS; `net_name` is the host interface.
    Bridged,
    /// Host-only network; `net_name` is the host-only interface.
    Host,
    /// Internal network between guests; `net_name` is the network name.
    Virtual,
    /// Card present, cable not connected to anything.
    Disabled,
}

impl NicMode {
    fn tool_name(self) -> &'static str {
        match self {
            NicMode::Nat => "nat",
            NicMode::Bridged => "bridged",
            NicMode::Host => "hostonly",
            NicMode::Virtual => "intnet",
            NicMode::Disabled => "null",
        }
    }

    /// The `modifyvm` flag naming the network, for modes that have one.
    fn net_flag(self) -> Option<&'static str> {
        match self {
            NicMode::Bridged => Some("bridgeadapter"),
            NicMode::Host => Some("hostonlyadapter"),
            NicMode::Virtual => Some("intnet"),
            NicMode::Nat | NicMode::Disabled => None,
        }
    }

    fn from_tool_name(s: &str) -> Option<Self> {
        match s {
            "nat" => Some(NicMode::Nat),
            "bridged" => Some(NicMode::Bridged),
            "hostonly" => Some(NicMode::Host),
            "intnet" => Some(NicMode::Virtual),
            "null" => Some(NicMode::Disabled),
            _ => None,
        }
    }
}

impl FromStr for NicMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nat" => Ok(NicMode::Nat),
            "bridged" => Ok(NicMode::Bridged),
            "host" => Ok(NicMode::Host),
            "virtual" => Ok(NicMode::Virtual),
            "disabled" => Ok(NicMode::Disabled),
            other => Err(Error::invalid("NIC mode", other)),
        }
    }
}

impl fmt::Display for NicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NicMode::Nat => "nat",
            NicMode::Bridged => "bridged",
            NicMode::Host => "host",
            NicMode::Virtual => "virtual",
            NicMode::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// The emulated NIC controller chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NicChip {
    /// AMD PCNet FAST III.
    #[default]
    Amd,
    /// Intel PRO/1000 MT Server.
    Intel,
    /// Intel PRO/1000 T Server, for Windows XP guests.
    IntelXp,
    /// Paravirtualized card; needs guest drivers.
    Virtio,
}

impl NicChip {
    fn tool_name(self) -> &'static str {
        match self {
            NicChip::Amd => "Am79C973",
            NicChip::Intel => "82545EM",
            NicChip::IntelXp => "82543GC",
            NicChip::Virtio => "virtio",
        }
    }

    fn from_tool_name(s: &str) -> Option<Self> {
        match s {
            "Am79C970A" | "Am79C973" => Some(NicChip::Amd),
            "82540OEM" | "82545EM" => Some(NicChip::Intel),
            "82543GC" => Some(NicChip::IntelXp),
            "virtio" => Some(NicChip::Virtio),
            _ => None,
        }
    }

    /// Chip used when none is given: virtio on internal networks, AMD
    /// everywhere else.
    pub fn default_for(mode: NicMode) -> Self {
        if mode == NicMode::Virtual {
            NicChip::Virtio
        } else {
            NicChip::Amd
        }
    }
}

impl FromStr for NicChip {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "amd" => Ok(NicChip::Amd),
            "intel" => Ok(NicChip::Intel),
            "intel_xp" => Ok(NicChip::IntelXp),
            "virtio" => Ok(NicChip::Virtio),
            other => Err(Error::invalid("NIC chipset", other)),
        }
    }
}

/// Strips separators and upper-cases a MAC address (`aa:bb:..` -> `AABB..`).
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Random unicast, locally administered MAC.
pub fn random_mac() -> String {
    let mut bytes: [u8; 6] = rand::random();
    bytes[0] = (bytes[0] & 0xF0) | 0x0A;
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Configuration for one network card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    pub mode: NicMode,
    pub chip: NicChip,
    /// Network the card is plugged into; meaning depends on `mode`.
    pub net_name: Option<String>,
    /// Twelve uppercase hex digits.
    pub mac: String,
    /// File receiving a network trace, if tracing is on.
    pub trace_file: Option<PathBuf>,
}

impl Default for Nic {
    fn default() -> Self {
        Nic::new(NicMode::Nat)
    }
}

impl Nic {
    /// A card in `mode` with the mode's default chip and a random MAC.
    pub fn new(mode: NicMode) -> Self {
        Nic {
            mode,
            chip: NicChip::default_for(mode),
            net_name: None,
            mac: random_mac(),
            trace_file: None,
        }
    }

    /// Card attached to the network `net_name`.
    pub fn attached(mode: NicMode, net_name: impl Into<String>) -> Self {
        Nic {
            net_name: Some(net_name.into()),
            ..Nic::new(mode)
        }
    }

    pub fn with_mac(mut self, mac: &str) -> Self {
        self.mac = normalize_mac(mac);
        self
    }

    /// `modifyvm` arguments describing this card in slot `slot` (1-based).
    pub fn to_params(&self, slot: usize) -> Result<Vec<String>> {
        let mut params = vec![format!("--nic{slot}"), self.mode.tool_name().to_string()];

        if let Some(flag) = self.mode.net_flag() {
            let net_name = self.net_name.as_deref().ok_or_else(|| {
                Error::InvalidConfig(format!("NIC {slot} in {} mode needs a network name", self.mode))
            })?;
            params.push(format!("--{flag}{slot}"));
            params.push(net_name.to_string());
        }

        params.push(format!("--nictype{slot}"));
        params.push(self.chip.tool_name().to_string());
        params.push(format!("--cableconnected{slot}"));
        params.push(on_off(true).to_string());
        params.push(format!("--macaddress{slot}"));
        params.push(self.mac.clone());

        params.push(format!("--nictrace{slot}"));
        match &self.trace_file {
            Some(file) => {
                params.push(on_off(true).to_string());
                params.push(format!("--nictracefile{slot}"));
                params.push(file.to_string_lossy().into_owned());
            }
            None => params.push(on_off(false).to_string()),
        }

        Ok(params)
    }

    /// `modifyvm` arguments removing the card in slot `slot`.
    pub fn empty_slot_params(slot: usize) -> Vec<String> {
        vec![format!("--nic{slot}"), "none".to_string()]
    }

    /// True if slot `slot` holds a card at all (`none` or a missing key
    /// means the slot is empty).
    pub fn slot_in_use(params: &Record, slot: usize) -> bool {
        params
            .get(&format!("nic{slot}"))
            .is_some_and(|mode| mode != "none")
    }

    /// Decodes slot `slot` of `showvminfo --machinereadable` output.
    ///
    /// An empty or missing slot decodes as a disabled card. A mode this crate
    /// does not model is an error rather than a silently dropped card.
    pub fn from_params(params: &Record, slot: usize) -> Result<Nic> {
        let mode = match params.get(&format!("nic{slot}")).map(String::as_str) {
            None | Some("none") => NicMode::Disabled,
            Some(name) => NicMode::from_tool_name(name).ok_or_else(|| {
                Error::Parse(format!("NIC {slot} uses unsupported mode '{name}'"))
            })?,
        };

        let net_name = mode
            .net_flag()
            .and_then(|flag| params.get(&format!("{flag}{slot}")))
            .cloned();
        let chip = params
            .get(&format!("nictype{slot}"))
            .and_then(|c| NicChip::from_tool_name(c))
            .unwrap_or_else(|| NicChip::default_for(mode));
        let mac = params
            .get(&format!("macaddress{slot}"))
            .map(|m| normalize_mac(m))
            .unwrap_or_else(random_mac);
        let trace_file = if params.get(&format!("nictrace{slot}")).map(String::as_str) == Some("on") {
            params.get(&format!("nictracefile{slot}")).map(PathBuf::from)
        } else {
            None
        };

        Ok(Nic {
            mode,
            chip,
            net_name,
            mac,
            trace_file,
        })
    }
}
