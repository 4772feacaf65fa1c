//! LapView Environment Abstraction Layer
//!
//! Playback in LapView is driven by a display-refresh cadence. This crate
//! hides where that cadence comes from so the same driver runs against:
//! - **Wall clock** (`SystemContext`): tokio timers and `Instant`
//! - **Virtual clock** (`VirtualContext`): time that only moves when told to
//!
//! With a virtual clock a full lap of playback completes instantly and every
//! frame lands on a reproducible timestamp.
//!
//! # Example
//!
//! ```ignore
//! use lapview_env::{ReplayContext, VirtualContext};
//!
//! async fn refresh_loop<Ctx: ReplayContext>(ctx: &Ctx) {
//!     loop {
//!         ctx.sleep(Duration::from_micros(16_667)).await;
//!         clock.tick(ctx.now_ms());
//!     }
//! }
//! ```

mod context;
mod system;
mod virtual_clock;

pub use context::ReplayContext;
pub use system::SystemContext;
pub use virtual_clock::VirtualContext;
