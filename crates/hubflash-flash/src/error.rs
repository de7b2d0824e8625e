//! Why a flashing run ended without success

use std::path::PathBuf;

use thiserror::Error;

use hubflash_core::firmware::{ImageError, MetadataProblem, PackageError};
use hubflash_core::HubType;
use hubflash_lwp3::{ConnectFailure, SendFailure};

/// Errors reported by the hub itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The bootloader did not recognize a command
    #[error("hub did not recognize the command")]
    UnknownCommand,
    /// Erase reported failure
    #[error("erasing the flash failed")]
    EraseFailed,
    /// Init reported failure
    #[error("initializing the bootloader failed")]
    InitFailed,
    /// The hub programmed a different number of bytes than sent
    #[error("hub programmed {actual} bytes, expected {expected}")]
    CountMismatch {
        /// Bytes sent
        expected: u32,
        /// Bytes the hub reported
        actual: u32,
    },
    /// The hub's running checksum disagrees with ours
    #[error("checksum mismatch: expected 0x{expected:02X}, hub reported 0x{actual:02X}")]
    ChecksumMismatch {
        /// Local checksum
        expected: u8,
        /// Checksum the hub reported
        actual: u8,
    },
}

/// Errors looking up bundled firmware
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Nothing at the expected location
    #[error("no firmware package at {}", .0.display())]
    NotFound(PathBuf),
    /// The package exists but could not be read
    #[error("{0}")]
    Package(PackageError),
}

/// Terminal failure of a flashing run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailReason {
    /// Could not open the link
    #[error("failed to connect: {0}")]
    FailedToConnect(ConnectFailure),
    /// The hub dropped the link
    #[error("hub disconnected")]
    Disconnected,
    /// A write failed
    #[error("Bluetooth error: {0}")]
    BleError(SendFailure),
    /// The hub did not reply in time
    #[error("timed out waiting for the hub")]
    TimedOut,
    /// The hub reported an error
    #[error("{0}")]
    HubError(HubError),
    /// No bundled firmware for this hub type
    #[error("no firmware available for this hub")]
    NoFirmware,
    /// The firmware is for a different hub type
    #[error("firmware is for {expected}, but the connected hub is {actual}")]
    DeviceMismatch {
        /// Hub type in the firmware metadata
        expected: HubType,
        /// Hub type reported by the bootloader
        actual: HubType,
    },
    /// Bundled firmware could not be loaded
    #[error("failed to fetch firmware: {0}")]
    FailedToFetch(FetchError),
    /// The firmware package is malformed
    #[error("invalid firmware package: {0}")]
    ZipError(PackageError),
    /// A metadata property is missing or unsupported
    #[error("firmware metadata '{property}' is {problem}")]
    BadMetadata {
        /// Metadata key
        property: &'static str,
        /// What is wrong with it
        problem: MetadataProblem,
    },
    /// The user program did not compile
    #[error("failed to compile program:\n{}", .0.join("\n"))]
    FailedToCompile(Vec<String>),
    /// The image does not fit in flash
    #[error("firmware image is {size} bytes, maximum is {max}")]
    FirmwareSize {
        /// Image size
        size: usize,
        /// Maximum allowed
        max: usize,
    },
    /// The custom hub name does not fit
    #[error("hub name is {len} bytes, maximum is {max}")]
    InvalidHubName {
        /// Encoded length
        len: usize,
        /// Longest name that fits
        max: usize,
    },
    /// Anything else, including internal errors
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl From<ImageError> for FailReason {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::Package(e) => Self::ZipError(e),
            ImageError::BadMetadata { property, problem } => Self::BadMetadata { property, problem },
            ImageError::FailedToCompile(lines) => Self::FailedToCompile(lines),
            ImageError::FirmwareSize { size, max } => Self::FirmwareSize { size, max },
            ImageError::InvalidHubName { len, max } => Self::InvalidHubName { len, max },
        }
    }
}

impl From<FetchError> for FailReason {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Package(e) => Self::ZipError(e),
            other => Self::FailedToFetch(other),
        }
    }
}

impl From<HubError> for FailReason {
    fn from(e: HubError) -> Self {
        Self::HubError(e)
    }
}
