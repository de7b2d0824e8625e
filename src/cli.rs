//! CLI argument parsing

use crate::transports;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate dynamic help text for the transport argument
fn transport_help() -> String {
    format!(
        "Transport to use [available: {}]",
        transports::transport_names_short()
    )
}

#[derive(Parser)]
#[command(name = "hubflash")]
#[command(author, version, about = "LEGO Powered Up hub firmware flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Hub profile and timeout configuration (TOML format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Firmware image options shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ImageArgs {
    /// Firmware package (firmware.zip or an unpacked directory)
    #[arg(short, long)]
    pub firmware: Option<PathBuf>,

    /// Python program to embed instead of the package's main.py
    #[arg(long)]
    pub program: Option<PathBuf>,

    /// Custom Bluetooth name for the hub
    #[arg(long)]
    pub name: Option<String>,

    /// mpy-cross executable
    #[arg(long, default_value = "mpy-cross")]
    pub mpy_cross: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash firmware to a hub in bootloader mode
    Flash {
        /// Transport to use
        #[arg(short, long, default_value = "ble", help = transport_help())]
        transport: String,

        /// Directory with bundled firmware packages (<hub>.zip or <hub>/)
        #[arg(long)]
        bundled: Option<PathBuf>,

        /// Do not show a progress bar
        #[arg(short, long)]
        quiet: bool,

        #[command(flatten)]
        image: ImageArgs,
    },

    /// Show bootloader information of a hub
    Info {
        /// Transport to use
        #[arg(short, long, default_value = "ble", help = transport_help())]
        transport: String,
    },

    /// Build a firmware image without flashing it
    BuildImage {
        #[command(flatten)]
        image: ImageArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List hub profiles
    ListHubs,

    /// List available transports
    ListTransports,
}
