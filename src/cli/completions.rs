//! Shell completion utilities

use crate::cli::commands::Cli;
use anyhow::{anyhow, Result};
use clap::CommandFactory;
use clap_complete::{generate, Generator, Shell};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Generate shell completions
pub fn print_completions<G: Generator>(gen: G, cmd: &mut clap::Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut std::io::stdout());
}

/// Install Fish completions automatically
pub fn install_fish_completions() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
    write_fish_completions(&home_dir)
}

fn write_fish_completions(home_dir: &Path) -> Result<PathBuf> {
    let fish_dir = home_dir.join(".config").join("fish").join("completions");
    fs::create_dir_all(&fish_dir)?;

    let completion_file = fish_dir.join("vboxctl.fish");
    let mut cmd = Cli::command();
    let mut file = File::create(&completion_file)?;
    generate(Shell::Fish, &mut cmd, "vboxctl", &mut file);
    file.flush()?;

    Ok(completion_file)
}

/// Render the man page
pub fn generate_man_page(out: &mut impl Write) -> Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    man.render(out)?;
    Ok(())
}
