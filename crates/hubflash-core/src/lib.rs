//! hubflash-core - Core library for LEGO Powered Up hub bootloaders
//!
//! This crate contains everything about flashing a hub that does not need a
//! live connection:
//!
//! - `protocol` - the LEGO Wireless Protocol v3 bootloader wire format
//! - `checksum` - whole-image checksums and the running XOR checksum
//! - `hub` / `config` - hub types and their per-device quirks
//! - `firmware` - firmware metadata, packages and image construction
//!
//! # Example
//!
//! ```ignore
//! use hubflash_core::protocol::{Request, Response};
//!
//! let frame = Request::Init { firmware_size: 1024 }.encode();
//! assert_eq!(frame, [0x44, 0x00, 0x04, 0x00, 0x00]);
//!
//! let reply = Response::decode(&[0x44, 0x00])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod checksum;
pub mod config;
pub mod error;
pub mod firmware;
pub mod hub;
pub mod protocol;

pub use config::{ConfigError, FlashConfig, HubProfile, Timeouts};
pub use error::{ProtocolError, Result};
pub use hub::HubType;
