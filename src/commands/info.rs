//! Info command implementation

use std::sync::Arc;

use hubflash_core::FlashConfig;
use hubflash_flash::Flasher;
use hubflash_lwp3::{Connection, Transport};

/// Run the info command
pub async fn run_info(
    transport: Arc<dyn Transport>,
    config: FlashConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let flasher = Flasher::new(Connection::new(transport)).with_config(config);
    let identity = flasher.identify().await?;
    let info = &identity.info;

    println!("Hub Bootloader Information");
    println!("==========================");
    println!();
    println!("Hub type:        {}", info.hub_type);
    println!(
        "Bootloader:      v{}.{}.{}",
        info.version >> 24,
        (info.version >> 16) & 0xFF,
        info.version & 0xFFFF
    );
    println!(
        "Flash:           0x{:08X} - 0x{:08X} ({} KiB)",
        info.start_address,
        info.end_address,
        info.flash_size() / 1024
    );
    match identity.protection {
        Some(level) => println!("Protection:      {}", level),
        None => println!("Protection:      not reported"),
    }

    Ok(())
}
