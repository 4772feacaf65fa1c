//! LapView Core - Multi-car Telemetry Replay Engine
//!
//! Replays recorded racing telemetry for several cars over a shared
//! reference path. Three engines carry the load:
//! 1. **Time Engine**: cursor-cached interpolation of irregular time series
//! 2. **Playback Engine**: frame-budgeted playhead with throttled overlay refresh
//! 3. **Scale Engine**: outlier-robust percentile normalization for colors and gauges
//!
//! Around them sit the session loader (`document`, `store`), per-lap overlay
//! traces and heatmaps (`overlay`), readouts (`readout`) and the track
//! projection and palettes used by renderers (`geometry`, `palette`).

pub mod document;
pub mod error;
pub mod geometry;
pub mod lapview_playback;
pub mod lapview_scale;
pub mod lapview_time;
pub mod overlay;
pub mod palette;
pub mod readout;
pub mod store;

// Re-export key types for convenience
pub use document::SessionDocument;
pub use error::LoadError;
pub use geometry::TrackBounds;
pub use lapview_playback::{PlayState, PlaybackClock, PlaybackConfig, PlaybackDriver, TickOutcome, TimeUpdate};
pub use lapview_scale::{percentile_magnitude, robust_scale, speed_gauge_max, ScaleSpec};
pub use lapview_time::{sample_at, Cursor, CursorSet};
pub use overlay::{HeatPalette, Heatmap, LapTrace, OverlaySnapshot, TraceConfig};
pub use readout::{LiveReadout, SpeedUnit, ViewState};
pub use store::{load_series_store, Channel, EntitySeries, Event, EventKind, Sample, SeriesStore};
