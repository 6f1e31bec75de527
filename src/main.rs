use anyhow::{anyhow, bail, Context, Result};
use clap::{CommandFactory, Parser};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vboxctl::cli::commands::{Cli, Cmd, DhcpCmd, DhcpTargetArgs, DiskCmd, NetCmd, VmCmd};
use vboxctl::cli::completions::{generate_man_page, install_fish_completions, print_completions};
use vboxctl::config::load_settings;
use vboxctl::config::schema::{NetSpec, Settings};
use vboxctl::net::dhcp::{Dhcp, DhcpSpec, DhcpTarget};
use vboxctl::vm::config::save_spec;
use vboxctl::vm::creator::{CreateParams, VmCreator};
use vboxctl::vm::disk::{CreateDiskParams, Disk};
use vboxctl::{Net, VirtualBox, Vm, VmManager};

/// Env var holding a log filter directive.
const LOG_ENV: &str = "VBOXCTL_LOG";

fn init_logging(verbose: u8, settings: &Settings) {
    let from_flags = match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    };
    let filter = from_flags
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_env(LOG_ENV).ok())
        .or_else(|| settings.log.as_deref().and_then(|d| EnvFilter::try_new(d).ok()))
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_vbox(explicit: Option<PathBuf>, settings: &Settings) -> Result<VirtualBox> {
    match explicit {
        Some(path) => Ok(VirtualBox::new(path.to_string_lossy())),
        None => VirtualBox::from_settings(settings).context("locating VBoxManage"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings().context("loading settings")?;
    init_logging(cli.verbose, &settings);

    match cli.cmd {
        Cmd::Completions { shell } => {
            print_completions(shell, &mut Cli::command());
            Ok(())
        }
        Cmd::InstallFish => {
            let path = install_fish_completions()?;
            println!("Fish completions installed to: {}", path.display());
            Ok(())
        }
        Cmd::ManPage => generate_man_page(&mut io::stdout()),
        cmd => {
            let vbox = open_vbox(cli.vboxmanage, &settings)?;
            run(&vbox, &settings, cmd)
        }
    }
}

fn run(vbox: &VirtualBox, settings: &Settings, cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Version => {
            let info = vbox.version()?;
            let Some(release) = &info.release else {
                return Err(vboxctl::Error::NotInstalled.into());
            };
            let mut line = format!("VirtualBox {release}");
            if let Some(edition) = info.edition.as_deref().filter(|e| !e.is_empty()) {
                line.push_str(&format!(" ({edition})"));
            }
            if let Some(svn) = info.svn {
                line.push_str(&format!(" r{svn}"));
            }
            println!("{line}");
        }
        Cmd::Ostypes => {
            let os_types = vbox.os_types()?;
            for (id, description) in os_types.iter() {
                let symbol = os_types.symbol(id).unwrap_or(id);
                println!("{symbol:<24} {description}");
            }
        }
        Cmd::Hostifs => {
            for nic in vbox.host_nics()? {
                println!(
                    "{:<16} {:<16} {}",
                    nic.name,
                    nic.ip.as_deref().unwrap_or("-"),
                    nic.mac.as_deref().unwrap_or("-")
                );
            }
        }
        Cmd::Vm(cmd) => run_vm(vbox, settings, cmd)?,
        Cmd::Disk(cmd) => run_disk(vbox, cmd)?,
        Cmd::Net(cmd) => run_net(vbox, cmd)?,
        Cmd::Dhcp(cmd) => run_dhcp(vbox, cmd)?,
        Cmd::Completions { .. } | Cmd::InstallFish | Cmd::ManPage => {}
    }
    Ok(())
}

fn run_vm(vbox: &VirtualBox, settings: &Settings, cmd: VmCmd) -> Result<()> {
    let manager = VmManager::new(vbox);
    match cmd {
        VmCmd::List { running } => {
            let vms = manager.list(running)?;
            if vms.is_empty() {
                println!("No VMs found.");
            }
            for vm in vms {
                println!("{} {{{}}}", vm.name, vm.uid);
            }
        }
        VmCmd::Create {
            name,
            cpus,
            ram,
            vram,
            os,
            nics,
            disks,
            spec,
            start,
            gui,
        } => {
            let params = CreateParams {
                name,
                cpus,
                ram,
                vram,
                os,
                nics,
                disks,
                spec,
                start,
                gui: gui || settings.gui,
            };
            let vm = VmCreator::create_vm(vbox, &params)
                .with_context(|| format!("creating VM '{}'", params.name))?;
            println!("Created VM '{}' ({})", vm.name, vm.uid);
        }
        VmCmd::Info { vm, json } => {
            let vm = manager.find(&vm)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&vm)?);
            } else {
                print_vm(&vm);
            }
        }
        VmCmd::Export { vm, output } => {
            let spec = manager.find(&vm)?.to_spec();
            match output {
                Some(path) => {
                    save_spec(&spec, &path)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&spec)?),
            }
        }
        VmCmd::Start { vm, gui } => {
            let vm = manager.start_vm(&vm, gui || settings.gui)?;
            println!("Started VM '{}'", vm.name);
        }
        VmCmd::Stop { vm } => {
            let vm = manager.stop_vm(&vm)?;
            println!("Stopped VM '{}'", vm.name);
        }
        VmCmd::Control { vm, action } => {
            let vm = manager.control_vm(&vm, action)?;
            println!("Sent {action} to VM '{}'", vm.name);
        }
        VmCmd::Delete {
            vm,
            force,
            keep_disks,
        } => {
            if manager.delete_vm(&vm, force, keep_disks)? {
                println!("Successfully deleted VM '{vm}'");
            }
        }
    }
    Ok(())
}

fn print_vm(vm: &Vm) {
    let board = &vm.board;
    println!("Name:      {}", vm.name);
    println!("UUID:      {}", vm.uid);
    println!("OS type:   {}", board.os);
    println!("CPUs:      {}", board.cpus);
    println!("Memory:    {} MB", board.ram);
    println!("Video RAM: {} MB", board.video_ram);
    println!("Firmware:  {}", if board.efi { "EFI" } else { "BIOS" });
    for (index, nic) in vm.nics.iter().enumerate() {
        if let Some(nic) = nic {
            println!(
                "NIC {}:     {} {} {}",
                index + 1,
                nic.mode,
                nic.net_name.as_deref().unwrap_or("-"),
                nic.mac
            );
        }
    }
    for bus in &vm.io_buses {
        println!("Storage:   {} ({}, {} ports)", bus.name, bus.bus, bus.max_ports);
        for ((port, device), disk) in &bus.disks {
            println!("  {port}:{device}  {}", disk.file.display());
        }
    }
}

fn mib_to_bytes(mib: u64) -> Result<u64> {
    mib.checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow!("disk size {mib} MiB is too large"))
}

fn run_disk(vbox: &VirtualBox, cmd: DiskCmd) -> Result<()> {
    match cmd {
        DiskCmd::Create {
            file,
            size,
            format,
            prealloc,
        } => {
            let format = format.map(|f| f.parse()).transpose()?;
            let disk = Disk::create(
                vbox,
                &CreateDiskParams {
                    file,
                    size: mib_to_bytes(size)?,
                    format,
                    prealloc,
                },
            )?;
            println!(
                "Created {} ({})",
                disk.file.display(),
                disk.uid.as_deref().unwrap_or("-")
            );
        }
        DiskCmd::List => {
            for disk in Disk::registered(vbox)? {
                println!(
                    "{:<5} {:<36} {}",
                    disk.media.medium_kind(),
                    disk.uid.as_deref().unwrap_or("-"),
                    disk.file.display()
                );
            }
        }
    }
    Ok(())
}

fn run_net(vbox: &VirtualBox, cmd: NetCmd) -> Result<()> {
    match cmd {
        NetCmd::List => {
            for net in Net::all(vbox)? {
                let dhcp = net
                    .dhcp
                    .as_ref()
                    .map(|d| format!("dhcp {}-{}", d.start_ip, d.end_ip))
                    .unwrap_or_default();
                println!(
                    "{:<12} {:<16} {:<16} {}",
                    net.if_name.as_deref().unwrap_or("-"),
                    net.ip.as_deref().unwrap_or("-"),
                    net.netmask.as_deref().unwrap_or("-"),
                    dhcp
                );
            }
        }
        NetCmd::Add {
            ip,
            netmask,
            dhcp_ip,
            dhcp_start,
        } => {
            let dhcp = (dhcp_ip.is_some() || dhcp_start.is_some()).then(|| DhcpSpec {
                ip: dhcp_ip,
                netmask: netmask.clone(),
                start_ip: dhcp_start,
                end_ip: None,
            });
            let mut net = Net::from_spec(&NetSpec { ip, netmask, dhcp })?;
            net.add(vbox)?;
            println!(
                "Created network {}",
                net.if_name.as_deref().unwrap_or("-")
            );
        }
        NetCmd::Remove { if_name } => {
            let net = Net::named(vbox, &if_name)?
                .ok_or_else(|| anyhow!("network '{if_name}' not found"))?;
            if !net.remove(vbox)? {
                bail!("network '{if_name}' was already removed");
            }
            println!("Removed network {if_name}");
        }
    }
    Ok(())
}

fn dhcp_target(args: DhcpTargetArgs) -> Result<DhcpTarget> {
    match (args.ifname, args.netname) {
        (Some(ifname), None) => Ok(DhcpTarget::Interface(ifname)),
        (None, Some(netname)) => Ok(DhcpTarget::Network(netname)),
        _ => bail!("pass exactly one of --ifname and --netname"),
    }
}

fn run_dhcp(vbox: &VirtualBox, cmd: DhcpCmd) -> Result<()> {
    match cmd {
        DhcpCmd::List => {
            for (network, dhcp) in Dhcp::all(vbox)? {
                println!(
                    "{:<40} {:<16} {}-{}",
                    network, dhcp.ip, dhcp.start_ip, dhcp.end_ip
                );
            }
        }
        DhcpCmd::Add {
            target,
            ip,
            netmask,
            start,
            end,
        } => {
            let target = dhcp_target(target)?;
            let dhcp = Dhcp::resolve(&DhcpSpec {
                ip,
                netmask,
                start_ip: start,
                end_ip: end,
            })?;
            dhcp.add(vbox, &target)?;
            println!(
                "Added DHCP server {} ({}-{})",
                dhcp.ip, dhcp.start_ip, dhcp.end_ip
            );
        }
        DhcpCmd::Remove { target } => {
            let target = dhcp_target(target)?;
            if !Dhcp::remove(vbox, &target)? {
                bail!("no DHCP server on {target:?}");
            }
            println!("Removed DHCP server");
        }
    }
    Ok(())
}
