//! CLI command definitions

use crate::vm::ControlAction;
use clap::{ArgGroup, Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// vboxctl CLI
#[derive(Parser, Debug)]
#[command(name = "vboxctl", version, about = "VirtualBox VM automation over VBoxManage")]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// VBoxManage binary to drive
    #[arg(long, env = "VBOXCTL_VBOXMANAGE", global = true)]
    pub vboxmanage: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Show the installed VirtualBox version
    Version,

    /// List the guest OS types VirtualBox supports
    Ostypes,

    /// List the host's network interfaces
    Hostifs,

    /// Manage virtual machines
    #[command(subcommand)]
    Vm(VmCmd),

    /// Manage disk images
    #[command(subcommand)]
    Disk(DiskCmd),

    /// Manage host-only networks
    #[command(subcommand)]
    Net(NetCmd),

    /// Manage DHCP servers
    #[command(subcommand)]
    Dhcp(DhcpCmd),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Install Fish shell completions automatically
    InstallFish,

    /// Generate man page
    ManPage,
}

#[derive(Subcommand, Debug)]
pub enum VmCmd {
    /// List registered VMs
    List {
        /// Only running VMs
        #[arg(long)]
        running: bool,
    },

    /// Create and register a new VM
    Create {
        name: String,

        /// Number of CPUs
        #[arg(long)]
        cpus: Option<u32>,

        /// Memory (MB)
        #[arg(long)]
        ram: Option<u32>,

        /// Video memory (MB)
        #[arg(long)]
        vram: Option<u32>,

        /// Guest OS type (see `vboxctl ostypes`)
        #[arg(long)]
        os: Option<String>,

        /// Network card as <mode>[:<network>] (nat|bridged|host|virtual|disabled); repeatable
        #[arg(long = "nic")]
        nics: Vec<String>,

        /// Disk or ISO image to attach to the SATA controller; repeatable
        #[arg(long = "disk")]
        disks: Vec<PathBuf>,

        /// JSON spec file with the full VM description
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Start the VM once registered
        #[arg(long)]
        start: bool,

        /// Show the VM window when starting
        #[arg(long)]
        gui: bool,
    },

    /// Show a VM's configuration
    Info {
        /// VM name or UUID
        vm: String,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Write a VM's configuration as a spec file
    Export {
        /// VM name or UUID
        vm: String,

        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Start a VM
    Start {
        /// VM name or UUID
        vm: String,

        /// Show the VM window
        #[arg(long)]
        gui: bool,
    },

    /// Power a VM off (no guest shutdown)
    Stop {
        /// VM name or UUID
        vm: String,
    },

    /// Send a control action to a running VM
    Control {
        /// VM name or UUID
        vm: String,

        #[arg(value_enum)]
        action: ControlAction,
    },

    /// Unregister a VM and delete its files
    Delete {
        /// VM name or UUID
        vm: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,

        /// Only unregister; leave disk images in place
        #[arg(long)]
        keep_disks: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum DiskCmd {
    /// Create a disk image
    Create {
        file: PathBuf,

        /// Size (MiB)
        #[arg(long)]
        size: u64,

        /// Image format (raw|vdi|vmdk|vhd); guessed from the extension if omitted
        #[arg(long)]
        format: Option<String>,

        /// Allocate the whole image up front
        #[arg(long)]
        prealloc: bool,
    },

    /// List registered disk and DVD images
    List,
}

#[derive(Subcommand, Debug)]
pub enum NetCmd {
    /// List host-only networks
    List,

    /// Create a host-only network
    Add {
        /// Host address on the network
        #[arg(long)]
        ip: Option<String>,

        #[arg(long)]
        netmask: Option<String>,

        /// Serve DHCP from this address
        #[arg(long)]
        dhcp_ip: Option<String>,

        /// First address of the DHCP pool
        #[arg(long)]
        dhcp_start: Option<String>,
    },

    /// Remove a host-only network and its DHCP server
    Remove { if_name: String },
}

#[derive(Subcommand, Debug)]
pub enum DhcpCmd {
    /// List DHCP servers
    List,

    /// Add a DHCP server
    Add {
        #[command(flatten)]
        target: DhcpTargetArgs,

        /// Server address
        #[arg(long)]
        ip: Option<String>,

        #[arg(long)]
        netmask: Option<String>,

        /// First pool address
        #[arg(long)]
        start: Option<String>,

        /// Last pool address
        #[arg(long)]
        end: Option<String>,
    },

    /// Remove a DHCP server
    Remove {
        #[command(flatten)]
        target: DhcpTargetArgs,
    },
}

/// Where a DHCP server lives
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["ifname", "netname"])))]
pub struct DhcpTargetArgs {
    /// Host-only interface, e.g. vboxnet0
    #[arg(long)]
    pub ifname: Option<String>,

    /// Internal network name
    #[arg(long)]
    pub netname: Option<String>,
}
