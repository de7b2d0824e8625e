//! Firmware package reader

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use zip::result::ZipError;
use zip::ZipArchive;

use thiserror::Error;

use super::{FirmwareMetadata, ImageError};

/// Firmware base binary entry
pub const FIRMWARE_BASE: &str = "firmware-base.bin";
/// Metadata entry
pub const METADATA_JSON: &str = "firmware.metadata.json";
/// Default user program entry
pub const MAIN_PY: &str = "main.py";

/// Errors reading a firmware package
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageError {
    /// A required entry does not exist
    #[error("missing {0}")]
    MissingEntry(String),
    /// An entry could not be read
    #[error("failed to read {entry}: {message}")]
    Io {
        /// Entry name
        entry: String,
        /// OS error text
        message: String,
    },
    /// The metadata entry is not valid JSON
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    /// The file is not a readable zip archive
    #[error("invalid archive: {0}")]
    Archive(String),
}

/// The contents of a firmware package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePackage {
    firmware_base: Vec<u8>,
    metadata: String,
    main_py: Option<String>,
}

impl FirmwarePackage {
    /// Create a package from its parts
    pub fn from_parts(
        firmware_base: Vec<u8>,
        metadata: impl Into<String>,
        main_py: Option<String>,
    ) -> Self {
        Self {
            firmware_base,
            metadata: metadata.into(),
            main_py,
        }
    }

    /// Read a package from a `firmware.zip` file or an unpacked directory
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PackageError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_zip(path)
        }
    }

    /// Read an unpacked package directory
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, PackageError> {
        let dir = dir.as_ref();
        log::debug!("Reading firmware package {}", dir.display());
        Self::assemble(|entry| match fs::read(dir.join(entry)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PackageError::Io {
                entry: entry.to_string(),
                message: e.to_string(),
            }),
        })
    }

    /// Read a `firmware.zip` file
    pub fn from_zip(path: impl AsRef<Path>) -> Result<Self, PackageError> {
        let path = path.as_ref();
        log::debug!("Reading firmware archive {}", path.display());
        let bytes = fs::read(path).map_err(|e| PackageError::Io {
            entry: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_zip_bytes(&bytes)
    }

    /// Read a `firmware.zip` archive held in memory
    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| PackageError::Archive(e.to_string()))?;
        Self::assemble(|entry| {
            let mut file = match archive.by_name(entry) {
                Ok(file) => file,
                Err(ZipError::FileNotFound) => return Ok(None),
                Err(e) => return Err(PackageError::Archive(e.to_string())),
            };
            let mut data = Vec::new();
            file.read_to_end(&mut data).map_err(|e| PackageError::Io {
                entry: entry.to_string(),
                message: e.to_string(),
            })?;
            Ok(Some(data))
        })
    }

    fn assemble(
        mut read_entry: impl FnMut(&str) -> Result<Option<Vec<u8>>, PackageError>,
    ) -> Result<Self, PackageError> {
        let firmware_base = read_entry(FIRMWARE_BASE)?
            .ok_or_else(|| PackageError::MissingEntry(FIRMWARE_BASE.to_string()))?;
        let metadata = read_entry(METADATA_JSON)?
            .ok_or_else(|| PackageError::MissingEntry(METADATA_JSON.to_string()))?;
        let metadata = String::from_utf8(metadata)
            .map_err(|e| PackageError::InvalidMetadata(e.to_string()))?;
        let main_py = match read_entry(MAIN_PY)? {
            Some(bytes) => Some(String::from_utf8(bytes).map_err(|e| PackageError::Io {
                entry: MAIN_PY.to_string(),
                message: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            firmware_base,
            metadata,
            main_py,
        })
    }

    /// The firmware base binary
    pub fn firmware_base(&self) -> &[u8] {
        &self.firmware_base
    }

    /// Parse the metadata entry
    pub fn read_metadata(&self) -> Result<FirmwareMetadata, ImageError> {
        FirmwareMetadata::from_json(&self.metadata)
    }

    /// The bundled `main.py`, if any
    pub fn main_py(&self) -> Option<&str> {
        self.main_py.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_from_zip_bytes() {
        let bytes = zip_of(&[
            (FIRMWARE_BASE, vec![1, 2, 3]),
            (METADATA_JSON, b"{}".to_vec()),
            (MAIN_PY, b"print('hi')".to_vec()),
        ]);
        let package = FirmwarePackage::from_zip_bytes(&bytes).unwrap();
        assert_eq!(package.firmware_base(), &[1, 2, 3]);
        assert_eq!(package.main_py(), Some("print('hi')"));
    }

    #[test]
    fn test_zip_missing_entry() {
        let bytes = zip_of(&[(METADATA_JSON, b"{}".to_vec())]);
        assert_eq!(
            FirmwarePackage::from_zip_bytes(&bytes).unwrap_err(),
            PackageError::MissingEntry(FIRMWARE_BASE.to_string())
        );
    }

    #[test]
    fn test_not_an_archive() {
        assert!(matches!(
            FirmwarePackage::from_zip_bytes(b"definitely not a zip"),
            Err(PackageError::Archive(_))
        ));
    }

    #[test]
    fn test_from_path_accepts_zip_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("firmware.zip");
        fs::write(
            &archive,
            zip_of(&[(FIRMWARE_BASE, vec![9; 4]), (METADATA_JSON, b"{}".to_vec())]),
        )
        .unwrap();
        assert_eq!(
            FirmwarePackage::from_path(&archive).unwrap().firmware_base(),
            &[9; 4]
        );

        fs::write(dir.path().join(FIRMWARE_BASE), [7; 4]).unwrap();
        fs::write(dir.path().join(METADATA_JSON), "{}").unwrap();
        assert_eq!(
            FirmwarePackage::from_path(dir.path()).unwrap().firmware_base(),
            &[7; 4]
        );
    }

    #[test]
    fn test_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FIRMWARE_BASE), [1, 2, 3]).unwrap();
        fs::write(dir.path().join(METADATA_JSON), "{}").unwrap();
        fs::write(dir.path().join(MAIN_PY), "print('hi')").unwrap();

        let package = FirmwarePackage::from_dir(dir.path()).unwrap();
        assert_eq!(package.firmware_base(), &[1, 2, 3]);
        assert_eq!(package.main_py(), Some("print('hi')"));
    }

    #[test]
    fn test_main_py_optional() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FIRMWARE_BASE), [0; 4]).unwrap();
        fs::write(dir.path().join(METADATA_JSON), "{}").unwrap();

        let package = FirmwarePackage::from_dir(dir.path()).unwrap();
        assert_eq!(package.main_py(), None);
    }

    #[test]
    fn test_missing_firmware_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_JSON), "{}").unwrap();

        assert_eq!(
            FirmwarePackage::from_dir(dir.path()).unwrap_err(),
            PackageError::MissingEntry(FIRMWARE_BASE.to_string())
        );
    }

    #[test]
    fn test_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FIRMWARE_BASE), [0; 4]).unwrap();

        assert_eq!(
            FirmwarePackage::from_dir(dir.path()).unwrap_err(),
            PackageError::MissingEntry(METADATA_JSON.to_string())
        );
    }
}
