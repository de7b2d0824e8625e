//! Bundled firmware lookup

use std::path::{Path, PathBuf};

use hubflash_core::firmware::FirmwarePackage;
use hubflash_core::HubProfile;

use crate::error::FetchError;

/// Where firmware for a hub comes from when none is given
pub trait FirmwareSource: Send + Sync {
    /// Location of the firmware for a hub, or `None` if there is none
    fn locate(&self, profile: &HubProfile) -> Option<PathBuf>;

    /// Load the package at `location`
    fn fetch(&self, location: &Path) -> Result<FirmwarePackage, FetchError>;
}

/// Firmware packages in one directory, one per hub
///
/// The package for a hub is `<root>/<firmware>.zip` or the unpacked
/// directory `<root>/<firmware>`, where `firmware` comes from the hub
/// profile. The archive wins when both exist.
#[derive(Debug, Clone)]
pub struct BundledFirmware {
    root: PathBuf,
}

impl BundledFirmware {
    /// Look up packages under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FirmwareSource for BundledFirmware {
    fn locate(&self, profile: &HubProfile) -> Option<PathBuf> {
        let name = profile.firmware.as_ref()?;
        let archive = self.root.join(format!("{}.zip", name));
        if archive.is_file() {
            Some(archive)
        } else {
            Some(self.root.join(name))
        }
    }

    fn fetch(&self, location: &Path) -> Result<FirmwarePackage, FetchError> {
        if !location.exists() {
            return Err(FetchError::NotFound(location.to_path_buf()));
        }
        log::info!("Using bundled firmware {}", location.display());
        FirmwarePackage::from_path(location).map_err(FetchError::Package)
    }
}
