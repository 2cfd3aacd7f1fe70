//! Renders the `provisioner(1)` manual page at build time.
//!
//! The page documents the `serve` subcommand and its flags from the same
//! clap definitions the binary parses, and lands in `OUT_DIR` as
//! `provisioner.1` for the release packaging to install. Runtime settings
//! are not command-line flags; they come from `PROVISIONER_*` variables and
//! `provisioner.toml`.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

const MAN_PAGE: &str = "provisioner.1";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var_os("OUT_DIR").map(PathBuf::from).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
    })?;
    render_man_page(&out_dir)?;
    Ok(())
}

fn render_man_page(out_dir: &Path) -> std::io::Result<()> {
    let command = Cli::command().after_help(
        "Configuration is read from PROVISIONER_* environment variables and provisioner.toml.",
    );
    let mut page = Vec::new();
    Man::new(command).render(&mut page)?;
    fs::write(out_dir.join(MAN_PAGE), page)
}
