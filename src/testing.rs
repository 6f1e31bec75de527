//! Test doubles for the VBoxManage boundary.

use crate::error::Result;
use crate::utils::system::{CommandOutput, CommandRunner};
use crate::vbox::VirtualBox;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Replies with canned output, matched on argument prefixes, and records
/// every call (program name stripped).
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    state: Rc<RefCell<Script>>,
}

#[derive(Default)]
struct Script {
    responses: Vec<(Vec<String>, CommandOutput)>,
    calls: Vec<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to any call whose arguments start with `prefix`. Earlier
    /// registrations win.
    pub fn respond(&self, prefix: &[&str], status: i32, output: &str) -> &Self {
        self.state.borrow_mut().responses.push((
            prefix.iter().map(|s| s.to_string()).collect(),
            CommandOutput {
                status,
                output: output.to_string(),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.borrow().calls.clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let args = argv[1..].to_vec();
        let mut state = self.state.borrow_mut();
        state.calls.push(args.clone());
        let reply = state
            .responses
            .iter()
            .find(|(prefix, _)| args.starts_with(prefix))
            .map(|(_, out)| out.clone())
            .unwrap_or(CommandOutput {
                status: 99,
                output: format!("unscripted command: {args:?}"),
            });
        Ok(reply)
    }
}

pub const OSTYPES: &str = "\
ID:          Other
Description: Other/Unknown
Family ID:   Other

ID:          Linux26
Description: Linux 2.6
Family ID:   Linux

ID:          Fedora
Description: Fedora
Family ID:   Linux

ID:          Ubuntu_64
Description: Ubuntu (64-bit)
Family ID:   Linux
";

pub const HOSTIFS: &str = "\
Name:            eth0
GUID:            00306e65-0000-4000-8000-3c0754471e4a
IPAddress:       192.168.1.20
NetworkMask:     255.255.255.0
HardwareAddress: 3c:07:54:47:1e:4a
";

#[derive(Default)]
struct FakeController {
    name: String,
    ctype: String,
    port_count: String,
    bootable: String,
    host_io_cache: String,
    attachments: BTreeMap<(u32, u32), String>,
}

#[derive(Default)]
struct FakeMachine {
    name: String,
    settings: BTreeMap<String, String>,
    controllers: Vec<FakeController>,
    running: bool,
}

struct FakeHostOnly {
    name: String,
    ip: String,
    netmask: String,
    mac: String,
}

struct FakeDhcp {
    ip: String,
    netmask: String,
    lower: String,
    upper: String,
}

struct FakeMedium {
    uid: String,
    path: String,
    format: String,
}

#[derive(Default)]
struct FakeState {
    machines: BTreeMap<String, FakeMachine>,
    host_only: Vec<FakeHostOnly>,
    dhcp: BTreeMap<String, FakeDhcp>,
    hdds: Vec<FakeMedium>,
    dvds: Vec<FakeMedium>,
    next_if: u32,
    failing: Vec<String>,
    calls: Vec<Vec<String>>,
}

/// A small stateful stand-in for VBoxManage.
///
/// It keeps registered machines, host-only interfaces, DHCP servers and
/// media in memory and answers the subset of subcommands this crate issues,
/// echoing configuration back in the tool's own output formats.
#[derive(Clone, Default)]
pub struct FakeVBoxManage {
    state: Rc<RefCell<FakeState>>,
}

impl FakeVBoxManage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context wired to this fake.
    pub fn context(&self) -> VirtualBox {
        VirtualBox::with_runner("VBoxManage", self.clone())
    }

    /// Make every `subcommand` call exit with status 1.
    pub fn fail_on(&self, subcommand: &str) {
        self.state.borrow_mut().failing.push(subcommand.to_string());
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.borrow().calls.clone()
    }

    /// Calls whose first argument is `subcommand`.
    pub fn calls_to(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.first().map(String::as_str) == Some(subcommand))
            .collect()
    }

    pub fn machine_count(&self) -> usize {
        self.state.borrow().machines.len()
    }

    pub fn host_only_count(&self) -> usize {
        self.state.borrow().host_only.len()
    }
}

fn ok(output: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status: 0,
        output: output.into(),
    }
}

fn fail(output: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status: 1,
        output: format!("VBoxManage: error: {}\n", output.into()),
    }
}

fn opt<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn new_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn max_ports_for(ctype: &str) -> &'static str {
    match ctype {
        "IntelAhci" => "30",
        "LsiLogic" | "BusLogic" => "16",
        "LSILogicSAS" => "255",
        "I82078" => "1",
        _ => "2",
    }
}

impl CommandRunner for FakeVBoxManage {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let mut args: Vec<String> = argv[1..].to_vec();
        if args.first().map(String::as_str) == Some("--nologo") {
            args.remove(0);
        }
        let mut state = self.state.borrow_mut();
        state.calls.push(args.clone());

        let Some(sub) = args.first().cloned() else {
            return Ok(fail("no command"));
        };
        if state.failing.contains(&sub) {
            return Ok(fail(format!("{sub} failed (injected)")));
        }
        Ok(state.dispatch(&sub, &args[1..]))
    }
}

impl FakeState {
    fn dispatch(&mut self, sub: &str, args: &[String]) -> CommandOutput {
        match sub {
            "--version" => ok("7.0.10r158379\n"),
            "list" => self.list(args),
            "createvm" => self.createvm(args),
            "modifyvm" => self.modifyvm(args),
            "showvminfo" => self.showvminfo(args),
            "storagectl" => self.storagectl(args),
            "storageattach" => self.storageattach(args),
            "startvm" => self.set_running(args.first(), true),
            "controlvm" => match args.get(1).map(String::as_str) {
                Some("poweroff") => self.set_running(args.first(), false),
                _ => self.set_running(args.first(), true),
            },
            "unregistervm" => match args.first().and_then(|u| self.machines.remove(u)) {
                Some(_) => ok(""),
                None => fail("Could not find a registered machine"),
            },
            "hostonlyif" => self.hostonlyif(args),
            "dhcpserver" => self.dhcpserver(args),
            "createhd" => self.createhd(args),
            "openmedium" => self.openmedium(args),
            "closemedium" => self.closemedium(args),
            other => fail(format!("unknown command {other}")),
        }
    }

    fn list(&self, args: &[String]) -> CommandOutput {
        let kind = args.last().map(String::as_str).unwrap_or_default();
        match kind {
            "vms" => ok(self
                .machines
                .iter()
                .map(|(uid, m)| format!("\"{}\" {{{}}}\n", m.name, uid))
                .collect::<String>()),
            "runningvms" => ok(self
                .machines
                .iter()
                .filter(|(_, m)| m.running)
                .map(|(uid, m)| format!("\"{}\" {{{}}}\n", m.name, uid))
                .collect::<String>()),
            "ostypes" => ok(OSTYPES),
            "hostifs" => ok(HOSTIFS),
            "hostonlyifs" => ok(self
                .host_only
                .iter()
                .map(|i| {
                    format!(
                        "Name:            {}\nDHCP:            Disabled\nIPAddress:       {}\nNetworkMask:     {}\nHardwareAddress: {}\nVBoxNetworkName: HostInterfaceNetworking-{}\n\n",
                        i.name, i.ip, i.netmask, i.mac, i.name
                    )
                })
                .collect::<String>()),
            "dhcpservers" => ok(self
                .dhcp
                .iter()
                .map(|(net, d)| {
                    format!(
                        "NetworkName:    {}\nIP:             {}\nNetworkMask:    {}\nlowerIPAddress: {}\nupperIPAddress: {}\nEnabled:        Yes\n\n",
                        net, d.ip, d.netmask, d.lower, d.upper
                    )
                })
                .collect::<String>()),
            "hdds" | "dvds" => {
                let media = if kind == "hdds" { &self.hdds } else { &self.dvds };
                ok(media
                    .iter()
                    .map(|m| {
                        format!(
                            "UUID:           {}\nParent UUID:    base\nState:          created\nType:           normal (base)\nLocation:       {}\nStorage format: {}\nFormat:         {}\n\n",
                            m.uid, m.path, m.format, m.format
                        )
                    })
                    .collect::<String>())
            }
            _ => fail(format!("unknown list {kind}")),
        }
    }

    fn createvm(&mut self, args: &[String]) -> CommandOutput {
        let (Some(name), Some(uid)) = (opt(args, "--name"), opt(args, "--uuid")) else {
            return fail("createvm needs --name and --uuid");
        };
        if self.machines.contains_key(uid) {
            return fail("machine already exists");
        }
        self.machines.insert(
            uid.to_string(),
            FakeMachine {
                name: name.to_string(),
                ..Default::default()
            },
        );
        ok(format!(
            "Virtual machine '{name}' is created and registered.\nUUID: {uid}\nSettings file: '/vms/{name}/{name}.vbox'\n"
        ))
    }

    fn modifyvm(&mut self, args: &[String]) -> CommandOutput {
        let Some(machine) = args.first().and_then(|u| self.machines.get_mut(u)) else {
            return fail("Could not find a registered machine");
        };
        for pair in args[1..].chunks(2) {
            let [flag, value] = pair else {
                return fail("missing value");
            };
            let key = flag.trim_start_matches("--");
            let key = match key {
                "biosbootmenu" => "bootmenu",
                other => other,
            };
            machine.settings.insert(key.to_string(), value.clone());
        }
        ok("")
    }

    fn showvminfo(&self, args: &[String]) -> CommandOutput {
        let Some(uid) = args.iter().find(|a| !a.starts_with("--")) else {
            return fail("no machine");
        };
        let Some(machine) = self.machines.get(uid) else {
            return fail("Could not find a registered machine");
        };

        let mut out = format!("name=\"{}\"\nUUID=\"{}\"\n", machine.name, uid);
        out.push_str(&format!(
            "VMState=\"{}\"\n",
            if machine.running { "running" } else { "poweroff" }
        ));
        for (key, value) in &machine.settings {
            if value.parse::<i64>().is_ok() {
                out.push_str(&format!("{key}={value}\n"));
            } else {
                out.push_str(&format!("{key}=\"{value}\"\n"));
            }
        }
        for (i, c) in machine.controllers.iter().enumerate() {
            out.push_str(&format!("storagecontrollername{i}=\"{}\"\n", c.name));
            out.push_str(&format!("storagecontrollertype{i}=\"{}\"\n", c.ctype));
            out.push_str(&format!("storagecontrollerinstance{i}=\"0\"\n"));
            out.push_str(&format!(
                "storagecontrollermaxportcount{i}=\"{}\"\n",
                max_ports_for(&c.ctype)
            ));
            out.push_str(&format!("storagecontrollerportcount{i}=\"{}\"\n", c.port_count));
            out.push_str(&format!("storagecontrollerbootable{i}=\"{}\"\n", c.bootable));
            out.push_str(&format!("storagecontrollerhostiocache{i}=\"{}\"\n", c.host_io_cache));
        }
        for c in &machine.controllers {
            for (&(port, device), medium) in &c.attachments {
                out.push_str(&format!("\"{}-{}-{}\"=\"{}\"\n", c.name, port, device, medium));
                if let Some(m) = self.hdds.iter().chain(&self.dvds).find(|m| &m.path == medium) {
                    out.push_str(&format!(
                        "\"{}-ImageUUID-{}-{}\"=\"{}\"\n",
                        c.name, port, device, m.uid
                    ));
                }
            }
        }
        ok(out)
    }

    fn storagectl(&mut self, args: &[String]) -> CommandOutput {
        let Some(machine) = args.first().and_then(|u| self.machines.get_mut(u)) else {
            return fail("Could not find a registered machine");
        };
        let Some(name) = opt(args, "--name") else {
            return fail("storagectl needs --name");
        };
        if has(args, "--remove") {
            let before = machine.controllers.len();
            machine.controllers.retain(|c| c.name != name);
            return if machine.controllers.len() < before {
                ok("")
            } else {
                fail("no such controller")
            };
        }
        if machine.controllers.iter().any(|c| c.name == name) {
            return fail("controller name already in use");
        }
        let ctype = opt(args, "--controller").unwrap_or("PIIX4").to_string();
        machine.controllers.push(FakeController {
            name: name.to_string(),
            port_count: opt(args, "--portcount")
                .unwrap_or(max_ports_for(&ctype))
                .to_string(),
            ctype,
            bootable: opt(args, "--bootable").unwrap_or("on").to_string(),
            host_io_cache: opt(args, "--hostiocache").unwrap_or("on").to_string(),
            attachments: BTreeMap::new(),
        });
        ok("")
    }

    fn storageattach(&mut self, args: &[String]) -> CommandOutput {
        let (Some(ctl), Some(port), Some(device), Some(medium)) = (
            opt(args, "--storagectl"),
            opt(args, "--port").and_then(|p| p.parse().ok()),
            opt(args, "--device").and_then(|d| d.parse().ok()),
            opt(args, "--medium"),
        ) else {
            return fail("storageattach needs --storagectl --port --device --medium");
        };
        let dvd = opt(args, "--type") == Some("dvddrive");
        let known = self.hdds.iter().chain(&self.dvds).any(|m| m.path == medium);
        if !known {
            let medium_record = FakeMedium {
                uid: new_uid(),
                path: medium.to_string(),
                format: "RAW".to_string(),
            };
            if dvd {
                self.dvds.push(medium_record);
            } else {
                self.hdds.push(medium_record);
            }
        }
        let Some(machine) = args.first().and_then(|u| self.machines.get_mut(u)) else {
            return fail("Could not find a registered machine");
        };
        let Some(controller) = machine.controllers.iter_mut().find(|c| c.name == ctl) else {
            return fail("Could not find a controller");
        };
        controller
            .attachments
            .insert((port, device), medium.to_string());
        ok("")
    }

    fn set_running(&mut self, uid: Option<&String>, running: bool) -> CommandOutput {
        match uid.and_then(|u| self.machines.get_mut(u)) {
            Some(machine) => {
                machine.running = running;
                ok("")
            }
            None => fail("Could not find a registered machine"),
        }
    }

    fn hostonlyif(&mut self, args: &[String]) -> CommandOutput {
        match args.first().map(String::as_str) {
            Some("create") => {
                let n = self.next_if;
                self.next_if += 1;
                let name = format!("vboxnet{n}");
                self.host_only.push(FakeHostOnly {
                    name: name.clone(),
                    ip: format!("192.168.{}.1", 56 + n),
                    netmask: "255.255.255.0".to_string(),
                    mac: format!("0a:00:27:00:00:{n:02x}"),
                });
                ok(format!(
                    "0%...10%...100%\nInterface '{name}' was successfully created\n"
                ))
            }
            Some("ipconfig") => {
                let Some(iface) = args
                    .get(1)
                    .and_then(|n| self.host_only.iter_mut().find(|i| &i.name == n))
                else {
                    return fail("no such interface");
                };
                if let Some(ip) = opt(args, "--ip") {
                    iface.ip = ip.to_string();
                }
                if let Some(mask) = opt(args, "--netmask") {
                    iface.netmask = mask.to_string();
                }
                ok("")
            }
            Some("remove") => {
                let before = self.host_only.len();
                if let Some(name) = args.get(1) {
                    self.host_only.retain(|i| &i.name != name);
                }
                if self.host_only.len() < before {
                    ok("")
                } else {
                    fail("no such interface")
                }
            }
            _ => fail("unknown hostonlyif command"),
        }
    }

    fn dhcpserver(&mut self, args: &[String]) -> CommandOutput {
        let net = match (opt(args, "--ifname"), opt(args, "--netname")) {
            (Some(ifname), _) => format!("HostInterfaceNetworking-{ifname}"),
            (None, Some(netname)) => netname.to_string(),
            _ => return fail("dhcpserver needs --ifname or --netname"),
        };
        match args.first().map(String::as_str) {
            Some("add") => {
                if self.dhcp.contains_key(&net) {
                    return fail("DHCP server already exists");
                }
                let (Some(ip), Some(netmask), Some(lower), Some(upper)) = (
                    opt(args, "--ip"),
                    opt(args, "--netmask"),
                    opt(args, "--lowerip"),
                    opt(args, "--upperip"),
                ) else {
                    return fail("missing DHCP parameters");
                };
                self.dhcp.insert(
                    net,
                    FakeDhcp {
                        ip: ip.to_string(),
                        netmask: netmask.to_string(),
                        lower: lower.to_string(),
                        upper: upper.to_string(),
                    },
                );
                ok("")
            }
            Some("remove") => match self.dhcp.remove(&net) {
                Some(_) => ok(""),
                None => fail("DHCP server does not exist"),
            },
            _ => fail("unknown dhcpserver command"),
        }
    }

    fn createhd(&mut self, args: &[String]) -> CommandOutput {
        let Some(path) = opt(args, "--filename") else {
            return fail("createhd needs --filename");
        };
        let uid = new_uid();
        self.hdds.push(FakeMedium {
            uid: uid.clone(),
            path: path.to_string(),
            format: opt(args, "--format").unwrap_or("VDI").to_string(),
        });
        ok(format!(
            "0%...10%...20%...100%\nMedium created. UUID: {uid}\n"
        ))
    }

    fn openmedium(&mut self, args: &[String]) -> CommandOutput {
        let (Some(kind), Some(path)) = (args.first(), args.get(1)) else {
            return fail("openmedium needs a type and a file");
        };
        let medium = FakeMedium {
            uid: opt(args, "--uuid").map(str::to_string).unwrap_or_else(new_uid),
            path: path.clone(),
            format: if kind == "dvd" { "RAW" } else { "VDI" }.to_string(),
        };
        if kind == "dvd" {
            self.dvds.push(medium);
        } else {
            self.hdds.push(medium);
        }
        ok("")
    }

    fn closemedium(&mut self, args: &[String]) -> CommandOutput {
        let (Some(kind), Some(path)) = (args.first(), args.get(1)) else {
            return fail("closemedium needs a type and a file");
        };
        let media = if kind == "dvd" { &mut self.dvds } else { &mut self.hdds };
        let before = media.len();
        media.retain(|m| &m.path != path);
        if media.len() < before {
            ok("")
        } else {
            fail("medium not registered")
        }
    }
}
