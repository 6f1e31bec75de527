//! vboxctl - VirtualBox automation library
//!
//! Models VirtualBox VMs, disks, host-only networks and DHCP servers as
//! plain Rust values and drives the `VBoxManage` tool to create, inspect
//! and remove them. Every operation is a blocking subprocess call made
//! through a [`VirtualBox`] context.

pub mod cli;
pub mod config;
pub mod error;
pub mod net;
pub mod utils;
pub mod vbox;
pub mod vm;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use cli::commands::Cli;
pub use error::{Error, Result};
pub use net::Net;
pub use vbox::VirtualBox;
pub use vm::manager::VmManager;
pub use vm::Vm;
