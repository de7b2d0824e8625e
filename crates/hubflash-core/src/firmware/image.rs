//! Firmware image construction

use super::{
    ChecksumType, Compiler, FirmwareMetadata, FirmwarePackage, HubNameRegion, ImageError,
    ImageLayout, MetadataProblem, PackageError, MAIN_PY, SUPPORTED_MPY_ABI,
};
use crate::checksum::{crc32, padded_words, sum_complement_32};
use crate::hub::HubType;

/// The exact bytes written to flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    device_id: HubType,
    checksum: u32,
}

impl FirmwareImage {
    /// Image bytes, checksum word included
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the image has no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hub type the image is built for
    pub fn device_id(&self) -> HubType {
        self.device_id
    }

    /// Value of the trailing checksum word
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Take the image bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Build the flash image for a package
///
/// For firmware that embeds the user program, `program` is compiled with
/// `compiler`; without one the package's `main.py` is used. `hub_name`
/// replaces the firmware's default name when it is non-empty.
pub fn build_image(
    package: &FirmwarePackage,
    program: Option<&str>,
    hub_name: Option<&str>,
    compiler: &dyn Compiler,
) -> Result<FirmwareImage, ImageError> {
    let metadata = package.read_metadata()?;
    let checksum_type = ChecksumType::from_name(&metadata.checksum_type)
        .ok_or_else(|| ImageError::bad("checksum-type", MetadataProblem::NotSupported))?;
    let base = package.firmware_base();

    let (mut data, checksum_offset) = match &metadata.layout {
        ImageLayout::EmbeddedProgram {
            mpy_abi_version,
            mpy_cross_options,
            user_mpy_offset,
            max_firmware_size,
            ..
        } => {
            if !SUPPORTED_MPY_ABI.contains(mpy_abi_version) {
                return Err(ImageError::bad(
                    "mpy-abi-version",
                    MetadataProblem::NotSupported,
                ));
            }
            if base.len() > *user_mpy_offset {
                return Err(ImageError::bad(
                    "user-mpy-offset",
                    MetadataProblem::NotSupported,
                ));
            }

            let script = program
                .or_else(|| package.main_py())
                .ok_or_else(|| PackageError::MissingEntry(MAIN_PY.to_string()))?;
            log::debug!(
                "Compiling program for mpy ABI v{} with {:?}",
                mpy_abi_version,
                mpy_cross_options
            );
            let mpy = compiler
                .compile(script, *mpy_abi_version, mpy_cross_options)
                .map_err(ImageError::FailedToCompile)?;

            // Checksum word goes on the next 4-byte boundary after the program
            let mpy_start = user_mpy_offset + 4;
            let checksum_offset = mpy_start + mpy.len().next_multiple_of(4);
            let size = checksum_offset + 4;
            if size > *max_firmware_size {
                return Err(ImageError::FirmwareSize {
                    size,
                    max: *max_firmware_size,
                });
            }

            let mut data = vec![0u8; size];
            data[..base.len()].copy_from_slice(base);
            data[*user_mpy_offset..mpy_start].copy_from_slice(&(mpy.len() as u32).to_le_bytes());
            data[mpy_start..mpy_start + mpy.len()].copy_from_slice(&mpy);
            (data, checksum_offset)
        }
        ImageLayout::Plain { checksum_size, .. } => {
            let checksum_offset = base.len().next_multiple_of(4);
            let size = checksum_offset + 4;
            if size > *checksum_size {
                return Err(ImageError::FirmwareSize {
                    size,
                    max: *checksum_size,
                });
            }

            let mut data = vec![0u8; size];
            data[..base.len()].copy_from_slice(base);
            (data, checksum_offset)
        }
    };

    if let Some(name) = hub_name.filter(|n| !n.is_empty()) {
        match metadata.hub_name_region() {
            Some(region) => write_hub_name(&mut data[..checksum_offset], region, name)?,
            None => log::warn!(
                "Firmware {} does not support a custom hub name, ignoring '{}'",
                metadata.firmware_version,
                name
            ),
        }
    }

    let checksum = image_checksum(checksum_type, &data, &metadata);
    data[checksum_offset..].copy_from_slice(&checksum.to_le_bytes());

    log::debug!(
        "Built {} byte image for {} (checksum 0x{:08X})",
        data.len(),
        metadata.device_id,
        checksum
    );

    Ok(FirmwareImage {
        data,
        device_id: metadata.device_id,
        checksum,
    })
}

/// Checksum over the image (checksum word still zero) and erased flash after it
fn image_checksum(kind: ChecksumType, data: &[u8], metadata: &FirmwareMetadata) -> u32 {
    let words = padded_words(data, metadata.max_size());
    match kind {
        ChecksumType::Sum => sum_complement_32(words),
        ChecksumType::Crc32 => crc32(words),
    }
}

fn write_hub_name(data: &mut [u8], region: HubNameRegion, name: &str) -> Result<(), ImageError> {
    let end = region.offset + region.size;
    if region.size == 0 || end > data.len() {
        return Err(ImageError::bad(
            "hub-name-offset",
            MetadataProblem::NotSupported,
        ));
    }

    // Leave room for the zero terminator
    let encoded = name.as_bytes();
    if encoded.len() >= region.size {
        return Err(ImageError::InvalidHubName {
            len: encoded.len(),
            max: region.size - 1,
        });
    }

    let field = &mut data[region.offset..end];
    field.fill(0);
    field[..encoded.len()].copy_from_slice(encoded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCompiler(Vec<u8>);

    impl Compiler for FixedCompiler {
        fn compile(&self, _: &str, _: u32, _: &[String]) -> Result<Vec<u8>, Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenCompiler;

    impl Compiler for BrokenCompiler {
        fn compile(&self, _: &str, _: u32, _: &[String]) -> Result<Vec<u8>, Vec<String>> {
            Err(vec!["SyntaxError: invalid syntax".to_string()])
        }
    }

    fn v1_metadata(version: &str, checksum: &str, abi: u32, max: usize) -> String {
        format!(
            r#"{{
                "metadata-version": "{version}",
                "device-id": 64,
                "checksum-type": "{checksum}",
                "firmware-version": "1.2.3",
                "max-firmware-size": {max},
                "mpy-abi-version": {abi},
                "mpy-cross-options": ["-mno-unicode"],
                "user-mpy-offset": 100,
                "hub-name-offset": 54,
                "max-hub-name-size": 10
            }}"#
        )
    }

    fn v2_metadata(checksum: &str) -> String {
        format!(
            r#"{{
                "metadata-version": "2.0.0",
                "device-id": 65,
                "firmware-version": "3.0.0",
                "checksum-type": "{checksum}",
                "checksum-size": 1024,
                "hub-name-offset": 54,
                "hub-name-size": 10
            }}"#
        )
    }

    fn package(metadata: String) -> FirmwarePackage {
        FirmwarePackage::from_parts(vec![0u8; 64], metadata, Some("print('hi')".to_string()))
    }

    fn word_sum(data: &[u8], max: usize) -> u32 {
        padded_words(data, max).fold(0u32, |t, w| t.wrapping_add(w))
    }

    #[test]
    fn test_v1_embeds_program() {
        let pkg = package(v1_metadata("1.1.0", "sum", 5, 1024));
        let image = build_image(&pkg, None, None, &FixedCompiler(vec![0xAB; 32])).unwrap();

        assert_eq!(image.len(), 140);
        assert_eq!(image.device_id(), HubType::MoveHub);
        let data = image.data();
        assert_eq!(&data[100..104], &32u32.to_le_bytes());
        assert!(data[104..136].iter().all(|b| *b == 0xAB));
        assert_eq!(&data[136..140], &image.checksum().to_le_bytes());
        // The checksum word cancels the rest of the flash region
        assert_eq!(word_sum(data, 1024), 0);
    }

    #[test]
    fn test_v1_program_length_padded_to_word() {
        let pkg = package(v1_metadata("1.1.0", "sum", 6, 1024));
        let image = build_image(&pkg, Some("x = 1"), None, &FixedCompiler(vec![1; 5])).unwrap();
        // 100 + 4 + 8 + 4
        assert_eq!(image.len(), 116);
        assert_eq!(&image.data()[100..104], &5u32.to_le_bytes());
    }

    #[test]
    fn test_v2_plain_image() {
        let pkg = package(v2_metadata("sum"));
        let image = build_image(&pkg, None, None, &BrokenCompiler).unwrap();
        assert_eq!(image.len(), 68);
        assert_eq!(image.device_id(), HubType::CityHub);
        assert_eq!(word_sum(image.data(), 1024), 0);
    }

    #[test]
    fn test_v2_crc32() {
        let pkg = package(v2_metadata("crc32"));
        let image = build_image(&pkg, None, None, &BrokenCompiler).unwrap();
        let mut zeroed = image.data().to_vec();
        zeroed[64..].fill(0);
        assert_eq!(image.checksum(), crc32(padded_words(&zeroed, 1024)));
    }

    #[test]
    fn test_hub_name() {
        let pkg = package(v1_metadata("1.1.0", "sum", 5, 1024));
        let image =
            build_image(&pkg, None, Some("abc"), &FixedCompiler(vec![0; 4])).unwrap();
        assert_eq!(&image.data()[54..57], b"abc");
        assert!(image.data()[57..64].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_hub_name_too_long() {
        let pkg = package(v2_metadata("sum"));
        let err = build_image(&pkg, None, Some("0123456789"), &BrokenCompiler).unwrap_err();
        assert_eq!(err, ImageError::InvalidHubName { len: 10, max: 9 });
    }

    #[test]
    fn test_v1_0_ignores_hub_name() {
        let pkg = package(v1_metadata("1.0.0", "sum", 5, 1024));
        let named = build_image(&pkg, None, Some("abc"), &FixedCompiler(vec![7; 8])).unwrap();
        let plain = build_image(&pkg, None, None, &FixedCompiler(vec![7; 8])).unwrap();
        assert_eq!(named, plain);
    }

    #[test]
    fn test_unknown_checksum_type() {
        let pkg = package(v1_metadata("1.1.0", "unknown-algo", 5, 1024));
        let err = build_image(&pkg, None, None, &FixedCompiler(vec![])).unwrap_err();
        assert_eq!(
            err,
            ImageError::BadMetadata {
                property: "checksum-type",
                problem: MetadataProblem::NotSupported
            }
        );
    }

    #[test]
    fn test_unsupported_abi() {
        let pkg = package(v1_metadata("1.1.0", "sum", 4, 1024));
        let err = build_image(&pkg, None, None, &FixedCompiler(vec![])).unwrap_err();
        assert_eq!(
            err,
            ImageError::BadMetadata {
                property: "mpy-abi-version",
                problem: MetadataProblem::NotSupported
            }
        );
    }

    #[test]
    fn test_too_large() {
        let pkg = package(v1_metadata("1.1.0", "sum", 5, 128));
        let err = build_image(&pkg, None, None, &FixedCompiler(vec![0; 32])).unwrap_err();
        assert_eq!(err, ImageError::FirmwareSize { size: 140, max: 128 });
    }

    #[test]
    fn test_compile_failure() {
        let pkg = package(v1_metadata("1.1.0", "sum", 5, 1024));
        let err = build_image(&pkg, None, None, &BrokenCompiler).unwrap_err();
        assert_eq!(
            err,
            ImageError::FailedToCompile(vec!["SyntaxError: invalid syntax".to_string()])
        );
    }

    #[test]
    fn test_missing_main_py() {
        let pkg = FirmwarePackage::from_parts(
            vec![0; 64],
            v1_metadata("1.1.0", "sum", 5, 1024),
            None,
        );
        let err = build_image(&pkg, None, None, &FixedCompiler(vec![])).unwrap_err();
        assert_eq!(
            err,
            ImageError::Package(PackageError::MissingEntry("main.py".to_string()))
        );
    }
}
