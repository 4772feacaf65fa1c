//! LapView Replay Harness
//!
//! Plays recorded (or synthetic) sessions without a display. The same
//! `PlaybackDriver` a viewer uses is run against a `ReplayContext`:
//!
//! - **Virtual time** (default): the refresh loop advances a virtual clock,
//!   so a whole session replays in milliseconds and every run is identical
//! - **Wall-clock time** (`--realtime`): the loop sleeps on tokio timers
//!
//! # Architecture
//!
//! ```text
//!  SessionDocument ──► SeriesStore ──► ReplayRunner ──► ReplayExport (JSON)
//!  (file/synthetic)                      │
//!                         PlaybackDriver ┤ on_tick    → frames (all cars)
//!                                        └ on_overlay → overlay snapshots
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lapview_replay::{generate_store, ReplayConfig, ReplayRunner, SyntheticConfig};
//! use lapview_env::VirtualContext;
//! use std::rc::Rc;
//!
//! let store = Rc::new(generate_store(&SyntheticConfig::default())?);
//! let runner = ReplayRunner::new(VirtualContext::shared(), ReplayConfig::default());
//! let outcome = runner.run(store).await;
//! ```

mod config;
mod error;
mod exporter;
mod runner;
pub mod synthetic;

pub use config::ReplayConfig;
pub use error::ReplayError;
pub use exporter::{EntityInfo, EventRecord, LapRow, ReplayExport};
pub use runner::{CarPosition, OverlayRecord, ReplayFrame, ReplayOutcome, ReplayRunner};
pub use synthetic::{generate, generate_store, SyntheticConfig};
