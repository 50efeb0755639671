//! Command-line interface definitions for the `cosb` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `cosb` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cosb",
    version,
    about = "Service broker provisioning tenant-scoped Ceph object storage",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Serve the broker API.
    #[command(name = "serve", about = "Serve the broker API")]
    Serve(ServeCommand),
    /// Validate a catalog file and print it as served.
    #[command(name = "catalog", about = "Validate a catalog file and print it as served")]
    Catalog(CatalogCommand),
}

/// Arguments for the `cosb serve` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ServeCommand {
    /// Address to listen on, overriding `listen_addr` from configuration.
    #[arg(long, value_name = "ADDR")]
    pub(crate) listen: Option<String>,
    /// Catalog file, overriding `catalog_path` from configuration.
    #[arg(long, value_name = "PATH")]
    pub(crate) catalog: Option<String>,
}

/// Arguments for the `cosb catalog` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CatalogCommand {
    /// Catalog file to validate.
    #[arg(long, value_name = "PATH", default_value = "catalog.json")]
    pub(crate) catalog: String,
}
