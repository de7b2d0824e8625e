//! Flash command implementation

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use hubflash_core::FlashConfig;
use hubflash_flash::{BundledFirmware, FlashEvent, FlashObserver, Flasher, NoProgress};
use hubflash_lwp3::{Connection, Transport};

use crate::cli::ImageArgs;
use crate::commands::image;

/// Resolution of the progress bar
const PROGRESS_STEPS: u64 = 1000;

/// Progress reporter using an indicatif progress bar
struct IndicatifProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Connecting to hub...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar: Mutex::new(Some(spinner)),
        }
    }

    fn bar(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FlashObserver for IndicatifProgress {
    fn on_event(&self, event: &FlashEvent) {
        let mut bar = self.bar();
        match event {
            FlashEvent::Started => {
                if let Some(spinner) = bar.take() {
                    spinner.finish_and_clear();
                }
                let pb = ProgressBar::new(PROGRESS_STEPS);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% ({eta}) Flashing")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                *bar = Some(pb);
            }
            FlashEvent::Progress(fraction) => {
                if let Some(pb) = bar.as_ref() {
                    pb.set_position((fraction.clamp(0.0, 1.0) * PROGRESS_STEPS as f32) as u64);
                }
            }
            FlashEvent::Finished => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message("Flash complete");
                }
            }
            FlashEvent::Failed(reason) => {
                if let Some(pb) = bar.take() {
                    pb.abandon_with_message(format!("Failed: {}", reason));
                }
            }
        }
    }
}

/// Run the flash command
pub async fn run_flash(
    transport: Arc<dyn Transport>,
    config: FlashConfig,
    bundled: Option<PathBuf>,
    quiet: bool,
    args: &ImageArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = image::load_request(args)?;
    if request.package.is_none() && bundled.is_none() {
        return Err("No firmware given: use --firmware <path> or --bundled <dir>".into());
    }

    let mut flasher = Flasher::new(Connection::new(transport))
        .with_config(config)
        .with_compiler(image::compiler(args));
    if let Some(root) = bundled {
        flasher = flasher.with_source(BundledFirmware::new(root));
    }

    println!("Turn on the hub while holding its button to enter bootloader mode");
    let progress: Box<dyn FlashObserver> = if quiet {
        Box::new(NoProgress)
    } else {
        Box::new(IndicatifProgress::new())
    };
    flasher.flash(request, progress.as_ref()).await?;

    println!("Flashing complete! The hub is restarting with the new firmware.");
    Ok(())
}
