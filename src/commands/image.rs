//! Firmware image loading and the build-image command

use std::fs;
use std::path::Path;

use hubflash_core::firmware::{build_image, FirmwarePackage};
use hubflash_flash::{FlashRequest, MpyCross};

use crate::cli::ImageArgs;

/// Turn image options into a flash request
pub fn load_request(args: &ImageArgs) -> Result<FlashRequest, Box<dyn std::error::Error>> {
    let package = match &args.firmware {
        Some(path) => {
            let package = FirmwarePackage::from_path(path)
                .map_err(|e| format!("Failed to read firmware package {:?}: {}", path, e))?;
            println!("Loaded firmware package {:?}", path);
            Some(package)
        }
        None => None,
    };

    let program = match &args.program {
        Some(path) => Some(
            fs::read_to_string(path)
                .map_err(|e| format!("Failed to read program {:?}: {}", path, e))?,
        ),
        None => None,
    };

    Ok(FlashRequest {
        package,
        program,
        hub_name: args.name.clone(),
    })
}

/// Compiler configured from the command line
pub fn compiler(args: &ImageArgs) -> MpyCross {
    MpyCross::new(&args.mpy_cross)
}

/// Run the build-image command
pub fn run_build_image(args: &ImageArgs, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let request = load_request(args)?;
    let package = request
        .package
        .as_ref()
        .ok_or("build-image requires a firmware package (--firmware)")?;

    let image = build_image(
        package,
        request.program.as_deref(),
        request.hub_name.as_deref(),
        &compiler(args),
    )?;

    fs::write(output, image.data())?;
    println!(
        "Wrote {} byte image for {} to {:?} (checksum 0x{:08X})",
        image.len(),
        image.device_id(),
        output,
        image.checksum()
    );
    Ok(())
}
