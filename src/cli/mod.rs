//! Command-line interface definitions for the `provisioner` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `provisioner` binary.
#[derive(Debug, Parser)]
#[command(
    name = "provisioner",
    about = "Accept cloud provisioning requests and queue them for asynchronous processing",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Serve the provisioning HTTP API.
    #[command(name = "serve", about = "Serve the provisioning HTTP API")]
    Serve(ServeCommand),
}

/// Arguments for the `provisioner serve` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ServeCommand {
    /// Run the queue consumer inside the API process.
    ///
    /// Required for the in-memory queue backend, whose messages are only
    /// visible to consumers in the same process.
    #[arg(long)]
    pub(crate) embedded_consumer: bool,
}
