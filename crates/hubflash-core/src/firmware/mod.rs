//! Firmware packages and image construction
//!
//! A firmware package holds the firmware base binary, a JSON metadata file
//! and, for older firmware, a `main.py` that is compiled and embedded into
//! the image. [`build_image`] turns a package into the exact bytes that are
//! written to flash, including the trailing checksum word.

mod compile;
mod image;
mod metadata;
mod package;

pub use compile::{Compiler, SUPPORTED_MPY_ABI};
pub use image::{build_image, FirmwareImage};
pub use metadata::{
    ChecksumType, FirmwareMetadata, HubNameRegion, ImageLayout, MetadataVersion,
};
pub use package::{FirmwarePackage, PackageError, FIRMWARE_BASE, MAIN_PY, METADATA_JSON};

use core::fmt;
use thiserror::Error;

/// What is wrong with a metadata property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataProblem {
    /// The property is required but absent
    Missing,
    /// The value is not one this tool can handle
    NotSupported,
}

impl fmt::Display for MetadataProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::NotSupported => write!(f, "not supported"),
        }
    }
}

/// Errors building a firmware image
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The package could not be read
    #[error("firmware package: {0}")]
    Package(#[from] PackageError),

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

    /// The image does not fit the flash region
    #[error("firmware image is {size} bytes, maximum is {max}")]
    FirmwareSize {
        /// Image size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// The hub name does not fit the name region
    #[error("hub name is {len} bytes, maximum is {max}")]
    InvalidHubName {
        /// Encoded name length
        len: usize,
        /// Longest name that fits
        max: usize,
    },
}

impl ImageError {
    pub(crate) fn bad(property: &'static str, problem: MetadataProblem) -> Self {
        Self::BadMetadata { property, problem }
    }
}
