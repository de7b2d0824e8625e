//! Transport layer abstraction for bootloader communication

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{ConnectFailure, SendFailure};

/// Something that happened on an open link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A notification frame from the hub
    Notification(Vec<u8>),
    /// The link went away, either on request or because the hub dropped it
    Dropped,
}

/// Duplex frame channel to one hub bootloader
///
/// Implementations allow only one write at a time; callers serialize
/// their writes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link
    ///
    /// The returned receiver yields every notification for the lifetime of
    /// the link and a final [`LinkEvent::Dropped`].
    async fn connect(&self) -> Result<UnboundedReceiver<LinkEvent>, ConnectFailure>;

    /// Write one frame
    ///
    /// With `require_ack` the call returns once the link layer acknowledged
    /// the write, otherwise once the frame was handed to the OS.
    async fn send(&self, frame: &[u8], require_ack: bool) -> Result<(), SendFailure>;

    /// Close the link
    ///
    /// A [`LinkEvent::Dropped`] is delivered even if the link was already
    /// failing.
    async fn disconnect(&self);
}
