//! Firmware metadata (`firmware.metadata.json`)

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{ImageError, MetadataProblem, PackageError};
use crate::hub::HubType;

/// Known metadata schema versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataVersion {
    /// 1.0.x: embedded user program, no hub name
    V1_0,
    /// 1.1.x: embedded user program and hub name
    V1_1,
    /// 2.x: no embedded program
    V2,
}

impl MetadataVersion {
    fn parse(version: &str) -> Option<Self> {
        let mut parts = version.split('.');
        let major = parts.next()?;
        let minor = parts.next().unwrap_or("0");
        match (major, minor) {
            ("1", "0") => Some(Self::V1_0),
            ("1", "1") => Some(Self::V1_1),
            ("2", _) => Some(Self::V2),
            _ => None,
        }
    }
}

/// Whole-image checksum algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    /// Two's complement of the word sum
    Sum,
    /// STM32 word CRC-32
    Crc32,
}

impl ChecksumType {
    /// Look up an algorithm by its metadata name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Self::Sum),
            "crc32" => Some(Self::Crc32),
            _ => None,
        }
    }
}

/// Location and size of the hub name inside the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubNameRegion {
    /// Byte offset in the image
    pub offset: usize,
    /// Size including the zero terminator
    pub size: usize,
}

/// How the image is laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLayout {
    /// A compiled user program is appended after the firmware base (v1.x)
    EmbeddedProgram {
        /// MicroPython bytecode ABI the firmware expects
        mpy_abi_version: u32,
        /// Extra `mpy-cross` arguments
        mpy_cross_options: Vec<String>,
        /// Offset of the program length word
        user_mpy_offset: usize,
        /// Largest image the flash can hold
        max_firmware_size: usize,
        /// Hub name region (v1.1 and later)
        hub_name: Option<HubNameRegion>,
    },
    /// The image is the firmware base followed by the checksum (v2.x)
    Plain {
        /// Size of the checksummed region
        checksum_size: usize,
        /// Hub name region
        hub_name: HubNameRegion,
    },
}

/// Parsed firmware metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareMetadata {
    /// Schema version
    pub version: MetadataVersion,
    /// Version of the firmware itself
    pub firmware_version: String,
    /// Hub type the firmware is built for
    pub device_id: HubType,
    /// Checksum algorithm name as written in the file
    pub checksum_type: String,
    /// Image layout
    pub layout: ImageLayout,
}

impl FirmwareMetadata {
    /// Parse metadata JSON
    ///
    /// Invalid JSON is a package error. A JSON object with absent or
    /// unusable properties is reported as bad metadata naming the property.
    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| PackageError::InvalidMetadata(e.to_string()))?;
        let map = match value {
            Value::Object(map) => map,
            _ => {
                return Err(
                    PackageError::InvalidMetadata("expected a JSON object".to_string()).into(),
                )
            }
        };

        let raw_version: String = field(&map, "metadata-version")?;
        let version = MetadataVersion::parse(&raw_version)
            .ok_or_else(|| ImageError::bad("metadata-version", MetadataProblem::NotSupported))?;

        let firmware_version = field(&map, "firmware-version")?;
        let device_id = HubType::from_id(field(&map, "device-id")?);
        let checksum_type = field(&map, "checksum-type")?;

        let layout = match version {
            MetadataVersion::V1_0 | MetadataVersion::V1_1 => {
                let hub_name = if version == MetadataVersion::V1_1 {
                    Some(HubNameRegion {
                        offset: field(&map, "hub-name-offset")?,
                        size: field(&map, "max-hub-name-size")?,
                    })
                } else {
                    None
                };
                ImageLayout::EmbeddedProgram {
                    mpy_abi_version: field(&map, "mpy-abi-version")?,
                    mpy_cross_options: field(&map, "mpy-cross-options")?,
                    user_mpy_offset: field(&map, "user-mpy-offset")?,
                    max_firmware_size: field(&map, "max-firmware-size")?,
                    hub_name,
                }
            }
            MetadataVersion::V2 => ImageLayout::Plain {
                checksum_size: field(&map, "checksum-size")?,
                hub_name: HubNameRegion {
                    offset: field(&map, "hub-name-offset")?,
                    size: field(&map, "hub-name-size")?,
                },
            },
        };

        Ok(Self {
            version,
            firmware_version,
            device_id,
            checksum_type,
            layout,
        })
    }

    /// Largest image allowed, which is also the checksummed region
    pub fn max_size(&self) -> usize {
        match &self.layout {
            ImageLayout::EmbeddedProgram {
                max_firmware_size, ..
            } => *max_firmware_size,
            ImageLayout::Plain { checksum_size, .. } => *checksum_size,
        }
    }

    /// Hub name region, if the firmware has one
    pub fn hub_name_region(&self) -> Option<HubNameRegion> {
        match &self.layout {
            ImageLayout::EmbeddedProgram { hub_name, .. } => *hub_name,
            ImageLayout::Plain { hub_name, .. } => Some(*hub_name),
        }
    }
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &'static str) -> Result<T, ImageError> {
    let value = map
        .get(key)
        .ok_or_else(|| ImageError::bad(key, MetadataProblem::Missing))?;
    serde_json::from_value(value.clone())
        .map_err(|_| ImageError::bad(key, MetadataProblem::NotSupported))
}
