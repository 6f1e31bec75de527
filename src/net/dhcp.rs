//! DHCP servers on VirtualBox networks

use crate::error::{Error, Result};
use crate::utils::ip::{ip_to_u32, u32_to_ip};
use crate::vbox::parse::Record;
use crate::vbox::VirtualBox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_NETMASK: &str = "255.255.255.0";

/// The network a DHCP server is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpTarget {
    /// A host-only interface, such as `vboxnet0`.
    Interface(String),
    /// A named internal network.
    Network(String),
}

impl DhcpTarget {
    fn args(&self) -> [&str; 2] {
        match self {
            DhcpTarget::Interface(name) => ["--ifname", name.as_str()],
            DhcpTarget::Network(name) => ["--netname", name.as_str()],
        }
    }

    /// Name VirtualBox lists the target's server under.
    pub fn network_name(&self) -> String {
        match self {
            DhcpTarget::Interface(name) => format!("HostInterfaceNetworking-{name}"),
            DhcpTarget::Network(name) => name.clone(),
        }
    }
}

/// Optional DHCP settings, as written in spec files or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DhcpSpec {
    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub start_ip: Option<String>,
    pub end_ip: Option<String>,
}

impl DhcpSpec {
    pub fn resolve(&self) -> Result<Dhcp> {
        Dhcp::resolve(self)
    }
}

/// A DHCP server with its address pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dhcp {
    /// The server's own address on the network it serves.
    pub ip: String,
    pub netmask: String,
    /// First address handed out.
    pub start_ip: String,
    /// Last address handed out.
    pub end_ip: String,
}

impl Dhcp {
    /// Server at `ip` with a /24 pool filling the rest of the subnet.
    pub fn at(ip: &str) -> Result<Dhcp> {
        Dhcp::resolve(&DhcpSpec {
            ip: Some(ip.to_string()),
            ..DhcpSpec::default()
        })
    }

    /// Fills in the unset fields of `spec`.
    ///
    /// Explicit values always win. The rest are derived in a fixed order:
    /// netmask (/24), then the server IP from the pool start, then the pool
    /// start from the server IP, then the pool end just below the broadcast
    /// address. At least one of `ip` and `start_ip` must be given.
    pub fn resolve(spec: &DhcpSpec) -> Result<Dhcp> {
        let netmask = ip_to_u32(spec.netmask.as_deref().unwrap_or(DEFAULT_NETMASK))?;

        let ip = match (&spec.ip, &spec.start_ip) {
            (Some(ip), _) => ip_to_u32(ip)?,
            (None, Some(start)) => (ip_to_u32(start)? & netmask).wrapping_add(1),
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "a DHCP server needs an IP address or a pool start address".to_string(),
                ))
            }
        };
        let start = match &spec.start_ip {
            Some(start) => ip_to_u32(start)?,
            None => ip.wrapping_add(1),
        };
        let end = match &spec.end_ip {
            Some(end) => ip_to_u32(end)?,
            None => (start & netmask).wrapping_add(!netmask).wrapping_sub(1),
        };

        Ok(Dhcp {
            ip: u32_to_ip(ip),
            netmask: u32_to_ip(netmask),
            start_ip: u32_to_ip(start),
            end_ip: u32_to_ip(end),
        })
    }

    /// `dhcpserver add` arguments, without the target.
    pub fn to_params(&self) -> Vec<String> {
        vec![
            "--ip".to_string(),
            self.ip.clone(),
            "--netmask".to_string(),
            self.netmask.clone(),
            "--lowerip".to_string(),
            self.start_ip.clone(),
            "--upperip".to_string(),
            self.end_ip.clone(),
            "--enable".to_string(),
        ]
    }

    /// Starts serving addresses on `target`.
    pub fn add(&self, vbox: &VirtualBox, target: &DhcpTarget) -> Result<()> {
        let mut args = vec!["dhcpserver".to_string(), "add".to_string()];
        args.extend(target.args().iter().map(|s| s.to_string()));
        args.extend(self.to_params());
        vbox.run_checked(&args)?;
        tracing::info!(?target, ip = %self.ip, "DHCP server added");
        Ok(())
    }

    /// Stops the server on `target`. Returns false if there was none; any
    /// other refusal is an [`Error::Command`].
    pub fn remove(vbox: &VirtualBox, target: &DhcpTarget) -> Result<bool> {
        let mut args = vec!["dhcpserver", "remove"];
        args.extend(target.args());
        let result = vbox.run(&args)?;
        if result.success() {
            tracing::info!(?target, "DHCP server removed");
            return Ok(true);
        }
        let network = target.network_name();
        let exists = vbox
            .list_long("dhcpservers")?
            .iter()
            .any(|info| info.get("NetworkName") == Some(&network));
        if exists {
            tracing::warn!(?target, status = result.status, "dhcpserver remove failed");
            return result.into_checked().map(|_| true);
        }
        tracing::debug!(?target, "no DHCP server to remove");
        Ok(false)
    }

    /// Every DHCP server, keyed by the name of the network it serves.
    pub fn all(vbox: &VirtualBox) -> Result<BTreeMap<String, Dhcp>> {
        Ok(vbox
            .list_long("dhcpservers")?
            .iter()
            .filter_map(Dhcp::from_dhcp_info)
            .collect())
    }

    /// Decodes one record of `list --long dhcpservers`; both the old and
    /// the 6.x key spellings are understood.
    fn from_dhcp_info(info: &Record) -> Option<(String, Dhcp)> {
        let pick = |keys: &[&str]| keys.iter().find_map(|k| info.get(*k)).cloned();

        let net_name = info.get("NetworkName")?.clone();
        let spec = DhcpSpec {
            ip: pick(&["IP", "Dhcpd IP"]),
            netmask: pick(&["NetworkMask"]),
            start_ip: pick(&["lowerIPAddress", "LowerIPAddress"]),
            end_ip: pick(&["upperIPAddress", "UpperIPAddress"]),
        };
        match Dhcp::resolve(&spec) {
            Ok(dhcp) => Some((net_name, dhcp)),
            Err(err) => {
                tracing::warn!(network = %net_name, error = %err, "skipping unreadable DHCP server");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVBoxManage;
    use crate::vbox::parse::parse_long_list;

    fn spec(ip: Option<&str>, start: Option<&str>) -> DhcpSpec {
        DhcpSpec {
            ip: ip.map(str::to_string),
            start_ip: start.map(str::to_string),
            ..DhcpSpec::default()
        }
    }

    #[test]
    fn defaults_from_server_ip() {
        let dhcp = Dhcp::at("192.168.0.1").unwrap();
        assert_eq!(dhcp.netmask, "255.255.255.0");
        assert_eq!(dhcp.start_ip, "192.168.0.2");
        assert_eq!(dhcp.end_ip, "192.168.0.254");
    }

    #[test]
    fn server_ip_from_pool_start() {
        let dhcp = Dhcp::resolve(&spec(None, Some("192.168.0.64"))).unwrap();
        assert_eq!(dhcp.ip, "192.168.0.1");
        assert_eq!(dhcp.start_ip, "192.168.0.64");
        assert_eq!(dhcp.end_ip, "192.168.0.254");
    }

    #[test]
    fn explicit_values_win() {
        let dhcp = Dhcp::resolve(&DhcpSpec {
            ip: Some("10.0.0.10".into()),
            netmask: Some("255.255.0.0".into()),
            start_ip: Some("10.0.1.0".into()),
            end_ip: None,
        })
        .unwrap();
        assert_eq!(dhcp.ip, "10.0.0.10");
        assert_eq!(dhcp.start_ip, "10.0.1.0");
        assert_eq!(dhcp.end_ip, "10.0.255.254");
    }

    #[test]
    fn needs_an_anchor_address() {
        assert!(matches!(
            Dhcp::resolve(&DhcpSpec::default()),
            Err(Error::InvalidConfig(_))
        ));
        assert!(Dhcp::at("192.168.0").is_err());
    }

    #[test]
    fn decodes_both_key_spellings() {
        let records = parse_long_list(
            "NetworkName:    HostInterfaceNetworking-vboxnet0\n\
             IP:             192.168.56.100\n\
             NetworkMask:    255.255.255.0\n\
             lowerIPAddress: 192.168.56.101\n\
             upperIPAddress: 192.168.56.254\n\
             Enabled:        Yes\n\
             \n\
             NetworkName:    lab\n\
             Dhcpd IP:       10.0.0.1\n\
             LowerIPAddress: 10.0.0.50\n\
             UpperIPAddress: 10.0.0.60\n\
             NetworkMask:    255.255.255.0\n",
        );
        let servers: BTreeMap<_, _> = records.iter().filter_map(Dhcp::from_dhcp_info).collect();

        assert_eq!(servers.len(), 2);
        assert_eq!(servers["HostInterfaceNetworking-vboxnet0"].ip, "192.168.56.100");
        assert_eq!(servers["lab"].ip, "10.0.0.1");
        assert_eq!(servers["lab"].start_ip, "10.0.0.50");
        assert_eq!(servers["lab"].end_ip, "10.0.0.60");
    }

    #[test]
    fn add_list_remove_on_internal_network() {
        let fake = FakeVBoxManage::new();
        let vbox = fake.context();
        let target = DhcpTarget::Network("lab".to_string());
        let dhcp = Dhcp::at("10.1.0.1").unwrap();

        dhcp.add(&vbox, &target).unwrap();
        let servers = Dhcp::all(&vbox).unwrap();
        assert_eq!(servers["lab"], dhcp);

        assert!(Dhcp::remove(&vbox, &target).unwrap());
        assert!(!Dhcp::remove(&vbox, &target).unwrap());
        assert!(Dhcp::all(&vbox).unwrap().is_empty());
    }

    #[test]
    fn refused_remove_keeps_exit_code() {
        let fake = FakeVBoxManage::new();
        let vbox = fake.context();
        let target = DhcpTarget::Interface("vboxnet0".to_string());
        Dhcp::at("192.168.56.2").unwrap().add(&vbox, &target).unwrap();
        fake.fail_on("dhcpserver");

        let err = Dhcp::remove(&vbox, &target).unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
    }

    #[test]
    fn unreadable_records_are_skipped() {
        let records = parse_long_list("NetworkName: broken\nNetworkMask: 255.255.255.0\n");
        assert!(records.iter().filter_map(Dhcp::from_dhcp_info).next().is_none());
    }

    #[test]
    fn interface_target_uses_ifname() {
        let fake = FakeVBoxManage::new();
        let vbox = fake.context();
        Dhcp::at("192.168.56.2")
            .unwrap()
            .add(&vbox, &DhcpTarget::Interface("vboxnet0".to_string()))
            .unwrap();

        let call = &fake.calls_to("dhcpserver")[0];
        assert!(call.windows(2).any(|w| w == ["--ifname", "vboxnet0"]));
        assert!(Dhcp::all(&vbox)
            .unwrap()
            .contains_key("HostInterfaceNetworking-vboxnet0"));
    }
}
