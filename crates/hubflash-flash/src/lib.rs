//! hubflash-flash - Firmware flashing for LEGO Powered Up hubs
//!
//! [`Flasher`] drives a complete run over a [`Connection`]: identify the hub,
//! resolve and build the firmware image, erase, program with periodic
//! checksum checks, verify and reboot. Requests go through a [`Correlator`]
//! that writes one frame at a time and matches replies by command.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hubflash_flash::{BundledFirmware, FlashEvent, FlashRequest, Flasher};
//! use hubflash_lwp3::{BleTransport, Connection};
//!
//! let connection = Connection::new(Arc::new(BleTransport::new()));
//! let flasher = Flasher::new(connection).with_source(BundledFirmware::new("firmware"));
//! flasher
//!     .flash(FlashRequest::default(), &|event: &FlashEvent| println!("{:?}", event))
//!     .await?;
//! ```
//!
//! [`Connection`]: hubflash_lwp3::Connection

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod correlator;
mod error;
mod events;
mod flasher;
mod ids;
mod mpy;
mod plan;
mod source;

pub use correlator::Correlator;
pub use error::{FailReason, FetchError, HubError};
pub use events::{FlashEvent, FlashObserver, NoProgress};
pub use flasher::{FlashRequest, Flasher, HubIdentity};
pub use ids::MessageIds;
pub use mpy::MpyCross;
pub use plan::{Packet, PacketPlan};
pub use source::{BundledFirmware, FirmwareSource};
