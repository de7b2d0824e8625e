//! hubflash-lwp3 - Transport for LWP3 hub bootloaders
//!
//! This crate owns the link to a hub bootloader. The rest of the workspace
//! only sees the [`Transport`] trait: connect, write one frame with or
//! without a link-layer acknowledgement, and a stream of incoming
//! notifications that ends with [`LinkEvent::Dropped`].
//!
//! [`Connection`] wraps a transport with the connection state machine and
//! hands out a [`Subscription`] to the notification stream that is torn down
//! with the link.
//!
//! # Supported Transports
//!
//! - Bluetooth Low Energy through `btleplug` (feature `ble`)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hubflash_lwp3::{BleTransport, Connection, LinkEvent};
//! use hubflash_core::protocol::Request;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = Connection::new(Arc::new(BleTransport::new()));
//! let mut subscription = connection.connect().await?;
//! connection.send(&Request::GetInfo.encode(), true).await?;
//! if let Some(LinkEvent::Notification(bytes)) = subscription.next().await {
//!     println!("{:02X?}", bytes);
//! }
//! connection.disconnect().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod connection;
mod error;
mod transport;

#[cfg(feature = "ble")]
mod ble;

pub use connection::{Connection, ConnectionState, Subscription};
pub use error::{ConnectFailure, SendFailure};
pub use transport::{LinkEvent, Transport};

#[cfg(feature = "ble")]
pub use ble::BleTransport;
