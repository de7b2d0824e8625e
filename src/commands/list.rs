//! List commands implementation

use hubflash_core::FlashConfig;

use crate::transports;

/// List all transports
pub fn list_transports() {
    print!("{}", transports::transport_help());
}

/// List the effective hub profiles
pub fn list_hubs(config: &FlashConfig) {
    println!("Hub profiles:");
    println!();
    println!(
        "{:<6} {:<14} {:>8} {:>9} {:>10} {:<12}",
        "Id", "Name", "Packet", "Checksum", "Erase ack", "Firmware"
    );
    println!("{}", "-".repeat(64));

    for hub in &config.hubs {
        println!(
            "0x{:02X}   {:<14} {:>8} {:>9} {:>10} {:<12}",
            hub.hub.id(),
            hub.name,
            hub.max_program_size,
            hub.checksum_interval,
            if hub.erase_ack() { "yes" } else { "no" },
            hub.firmware.as_deref().unwrap_or("-")
        );
    }
}
