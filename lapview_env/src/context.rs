//! Core time-source trait for playback drivers.

use async_trait::async_trait;
use std::time::Duration;

/// The playback driver's view of time.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `tokio::time`, `Instant`
/// - **Testing / headless**: `VirtualContext` - manually advanced clock
#[async_trait]
pub trait ReplayContext: Send + Sync + 'static {
    /// Returns the monotonic time elapsed since the context was created.
    ///
    /// This is the timestamp handed to every refresh callback.
    fn now(&self) -> Duration;

    /// Suspends until the next refresh should happen.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In virtual time: advances the clock and returns immediately
    async fn sleep(&self, duration: Duration);

    /// Returns `true` when time only advances through `sleep`.
    fn is_virtual(&self) -> bool {
        false
    }

    /// Current time in fractional milliseconds.
    fn now_ms(&self) -> f64 {
        self.now().as_secs_f64() * 1000.0
    }
}
