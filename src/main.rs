//! hubflash - LEGO Powered Up hub firmware flasher
//!
//! Flashes firmware to hubs whose bootloader speaks the LEGO Wireless
//! Protocol v3 bootloader commands (Move Hub, City Hub, Technic Hub).
//!
//! # Architecture
//!
//! - `hubflash-core` builds firmware images and encodes the wire protocol
//! - `hubflash-lwp3` provides the transport (BLE via btleplug)
//! - `hubflash-flash` runs the flashing state machine over a transport
//! - `hubflash-dummy` emulates a hub for testing without hardware

mod cli;
mod commands;
mod transports;

use clap::Parser;
use cli::{Cli, Commands};
use hubflash_core::FlashConfig;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Flash {
            transport,
            bundled,
            quiet,
            image,
        } => {
            let transport = transports::open_transport(&transport)?;
            commands::flash::run_flash(transport, config, bundled, quiet, &image).await
        }
        Commands::Info { transport } => {
            let transport = transports::open_transport(&transport)?;
            commands::info::run_info(transport, config).await
        }
        Commands::BuildImage { image, output } => {
            commands::image::run_build_image(&image, &output)
        }
        Commands::ListHubs => {
            commands::list_hubs(&config);
            Ok(())
        }
        Commands::ListTransports => {
            commands::list_transports();
            Ok(())
        }
    }
}

/// Load the hub profiles, merged with a config file if one was given
fn load_config(path: Option<&Path>) -> Result<FlashConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let config = FlashConfig::from_toml_file(path)?;
            log::info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => Ok(FlashConfig::default()),
    }
}
