//! Virtual clock implementing ReplayContext for deterministic playback.

use crate::ReplayContext;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Context whose time only moves when advanced.
///
/// `sleep` advances the clock by the requested duration and returns at once,
/// so a driver looping on `sleep` + `now` sees a perfectly regular cadence.
/// Clones share the same clock.
pub struct VirtualContext {
    /// Current virtual time (nanoseconds since creation)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl VirtualContext {
    /// Creates a new VirtualContext at time zero.
    pub fn new() -> Self {
        Self {
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.lock();
        *time = time.saturating_add(duration.as_nanos() as u64);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        *self.lock() = time_ns;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        // A poisoned u64 is still a valid timestamp.
        self.virtual_time_ns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for VirtualContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for VirtualContext {
    fn clone(&self) -> Self {
        Self {
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
        }
    }
}

#[async_trait]
impl ReplayContext for VirtualContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }

    fn is_virtual(&self) -> bool {
        true
    }
}
