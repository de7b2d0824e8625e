//! Correlation ids

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Source of request correlation ids
///
/// Ids start at 0 and increase by one per request. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct MessageIds(Arc<AtomicU32>);

impl MessageIds {
    /// New counter starting at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next id
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Start over at 0
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}
