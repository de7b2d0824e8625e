//! Error types for the bootloader link

use thiserror::Error;

/// Reasons a connection attempt fails
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectFailure {
    /// The host has no usable Bluetooth stack
    #[error("this platform does not support Bluetooth")]
    NoPlatformSupport,

    /// No Bluetooth adapter, or the radio is off
    #[error("Bluetooth is not available")]
    NoBluetooth,

    /// No hub was selected or found in bootloader mode
    #[error("no hub selected")]
    Canceled,

    /// The device does not expose the bootloader service
    ///
    /// This is often a transient problem of the OS Bluetooth stack and can
    /// be retried.
    #[error("bootloader GATT service not found")]
    GattServiceNotFound,

    /// Anything else
    #[error("connection failed: {0}")]
    Unknown(String),
}

/// Reasons writing a frame fails
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendFailure {
    /// There is no open link
    #[error("not connected")]
    NotConnected,

    /// The transport rejected the write
    #[error("write failed: {0}")]
    Failed(String),
}
