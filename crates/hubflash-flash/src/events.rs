//! Progress reporting

use crate::error::FailReason;

/// Progress of a flashing run
#[derive(Debug, Clone, PartialEq)]
pub enum FlashEvent {
    /// Firmware is resolved and erasing starts
    Started,
    /// Fraction of the image written, 0.0 to 1.0
    Progress(f32),
    /// The hub was told to start the new firmware
    Finished,
    /// The run failed
    Failed(FailReason),
}

/// Receives [`FlashEvent`]s
pub trait FlashObserver: Send + Sync {
    /// Called for every event, in order
    fn on_event(&self, event: &FlashEvent);
}

impl<F> FlashObserver for F
where
    F: Fn(&FlashEvent) + Send + Sync,
{
    fn on_event(&self, event: &FlashEvent) {
        self(event)
    }
}

/// Observer that ignores everything
pub struct NoProgress;

impl FlashObserver for NoProgress {
    fn on_event(&self, _event: &FlashEvent) {}
}
