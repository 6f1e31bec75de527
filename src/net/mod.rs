//! Host-only virtual networks

pub mod dhcp;

use crate::config::schema::NetSpec;
use crate::error::{Error, Result};
use crate::vbox::parse::Record;
use crate::vbox::VirtualBox;
use crate::vm::nic::normalize_mac;
use dhcp::{Dhcp, DhcpTarget};
use serde::Serialize;

/// A host-only network: a virtual NIC on the host, optionally served by a
/// DHCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Net {
    /// Host address on the network; VirtualBox picks one when unset.
    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub dhcp: Option<Dhcp>,
    /// Host interface name, assigned by VirtualBox on [`Net::add`].
    pub if_name: Option<String>,
    /// VirtualBox's internal name for the network.
    pub name: Option<String>,
    /// Host interface MAC, twelve uppercase hex digits.
    pub mac: Option<String>,
}

impl Net {
    pub fn new(ip: Option<String>, netmask: Option<String>) -> Self {
        Net {
            ip,
            netmask,
            ..Net::default()
        }
    }

    /// Network described by `spec`, with DHCP defaults resolved.
    pub fn from_spec(spec: &NetSpec) -> Result<Self> {
        let dhcp = spec.dhcp.as_ref().map(|d| d.resolve()).transpose()?;
        Ok(Net {
            ip: spec.ip.clone(),
            netmask: spec.netmask.clone(),
            dhcp,
            ..Net::default()
        })
    }

    pub fn with_dhcp(mut self, dhcp: Dhcp) -> Self {
        self.dhcp = Some(dhcp);
        self
    }

    /// True if the host interface exists.
    pub fn is_live(&self, vbox: &VirtualBox) -> Result<bool> {
        match &self.if_name {
            Some(if_name) => Ok(Net::named(vbox, if_name)?.is_some()),
            None => Ok(false),
        }
    }

    /// Creates the host interface, then applies the address and DHCP
    /// settings. The interface is removed again if a later step fails.
    pub fn add(&mut self, vbox: &VirtualBox) -> Result<()> {
        if let Some(if_name) = &self.if_name {
            return Err(Error::InvalidConfig(format!(
                "network {if_name} is already added"
            )));
        }

        let output = vbox.run_checked(&["--nologo", "hostonlyif", "create"])?;
        let if_name = created_interface(&output).ok_or_else(|| {
            Error::Parse(format!("hostonlyif create did not name the interface:\n{output}"))
        })?;
        self.if_name = Some(if_name.clone());

        if let Err(err) = self.configure(vbox, &if_name) {
            tracing::warn!(%if_name, error = %err, "configuring network failed, removing it");
            remove_interface(vbox, &if_name)?;
            self.if_name = None;
            return Err(err);
        }

        tracing::info!(%if_name, ip = ?self.ip, "host-only network added");
        Ok(())
    }

    fn configure(&mut self, vbox: &VirtualBox, if_name: &str) -> Result<()> {
        let listed = Net::named(vbox, if_name)?
            .ok_or_else(|| Error::Parse(format!("network {if_name} is missing from the list")))?;
        self.name = listed.name;
        self.mac = listed.mac;

        let ip_differs = self.ip.is_some() && self.ip != listed.ip;
        let netmask_differs = self.netmask.is_some() && self.netmask != listed.netmask;
        if ip_differs || netmask_differs {
            let ip = self.ip.clone().or(listed.ip).unwrap_or_default();
            let netmask = self.netmask.clone().or(listed.netmask).unwrap_or_default();
            vbox.run_checked(&[
                "--nologo",
                "hostonlyif",
                "ipconfig",
                if_name,
                "--ip",
                ip.as_str(),
                "--netmask",
                netmask.as_str(),
            ])?;
            self.ip = Some(ip);
            self.netmask = Some(netmask);
        } else {
            self.ip = listed.ip;
            self.netmask = listed.netmask;
        }

        if let Some(dhcp) = &self.dhcp {
            dhcp.add(vbox, &DhcpTarget::Interface(if_name.to_string()))?;
        }
        Ok(())
    }

    /// Removes the DHCP server, if any, then the host interface.
    ///
    /// Returns false if the network was never added or is already gone; a
    /// refusal while the interface still exists is an [`Error::Command`].
    pub fn remove(&self, vbox: &VirtualBox) -> Result<bool> {
        let Some(if_name) = &self.if_name else {
            return Ok(false);
        };
        if self.dhcp.is_some() {
            Dhcp::remove(vbox, &DhcpTarget::Interface(if_name.clone()))?;
        }
        remove_interface(vbox, if_name)
    }

    /// Every host-only network, with its DHCP server when one is set up.
    pub fn all(vbox: &VirtualBox) -> Result<Vec<Net>> {
        let mut servers = Dhcp::all(vbox)?;
        Ok(vbox
            .list_long("hostonlyifs")?
            .iter()
            .filter_map(Net::from_net_info)
            .map(|mut net| {
                net.dhcp = net.name.as_ref().and_then(|name| servers.remove(name));
                net
            })
            .collect())
    }

    /// The network on host interface `if_name`.
    pub fn named(vbox: &VirtualBox, if_name: &str) -> Result<Option<Net>> {
        Ok(Net::all(vbox)?
            .into_iter()
            .find(|net| net.if_name.as_deref() == Some(if_name)))
    }

    fn from_net_info(info: &Record) -> Option<Net> {
        Some(Net {
            if_name: Some(info.get("Name")?.clone()),
            name: info.get("VBoxNetworkName").cloned(),
            mac: info.get("HardwareAddress").map(|m| normalize_mac(m)),
            ip: info.get("IPAddress").cloned(),
            netmask: info.get("NetworkMask").cloned(),
            dhcp: None,
        })
    }
}

/// Interface name from `Interface 'vboxnet0' was successfully created`.
fn created_interface(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let lower = line.to_ascii_lowercase();
        let start = lower.find("interface '")? + "interface '".len();
        let len = line[start..].find('\'')?;
        if !lower[start + len..].contains("created") {
            return None;
        }
        Some(line[start..start + len].to_string())
    })
}

fn remove_interface(vbox: &VirtualBox, if_name: &str) -> Result<bool> {
    let result = vbox.run(&["--nologo", "hostonlyif", "remove", if_name])?;
    if result.success() {
        tracing::info!(%if_name, "host-only network removed");
        return Ok(true);
    }
    if Net::named(vbox, if_name)?.is_some() {
        tracing::warn!(%if_name, status = result.status, "hostonlyif remove failed");
        return result.into_checked().map(|_| true);
    }
    Ok(false)
}
