//! Overlay Derivation - drawable series computed from sampled telemetry.
//!
//! - **Lap traces**: one channel of one lap plotted against distance (`relS`),
//!   used for the time-delta band and the steering trace
//! - **Heatmap**: track segments colored by longitudinal acceleration,
//!   normalized against a robust (p90) scale
//!
//! These are pure functions of the store, the view state and a time value.
//! Drawing is left to the renderer.

use crate::lapview_scale::{robust_scale, ScaleSpec};
use crate::lapview_time::CursorSet;
use crate::palette::Rgb;
use crate::readout::{LiveReadout, ViewState};
use crate::store::{Channel, EntitySeries, Sample, SeriesStore};
use nalgebra::Point2;
use serde::Serialize;

// ============================================================================
// LAP TRACES
// ============================================================================

/// Configuration for lap traces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceConfig {
    /// Minimum half-height of the symmetric y-scale
    pub min_y_scale: f64,
}

impl TraceConfig {
    pub const DELTA: TraceConfig = TraceConfig { min_y_scale: 0.05 };
    pub const STEERING: TraceConfig = TraceConfig { min_y_scale: 1.0 };
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::DELTA
    }
}

/// One point of a lap trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TracePoint {
    pub rel_s: f64,
    pub value: f64,
}

/// A channel over one lap, ordered by distance.
///
/// `y_scale` is the half-height of a symmetric axis `[-y_scale, +y_scale]`.
/// For the delta channel negative values mean ahead of the reference lap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapTrace {
    pub lap: u32,
    pub channel: Channel,
    pub points: Vec<TracePoint>,
    pub y_scale: f64,
}

impl LapTrace {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Samples of `series` on `lap` with finite `relS` and `channel`, sorted by `relS`.
///
/// Recording order is not trusted: samples whose timestamps wrap still come
/// out in distance order. Ties keep recording order.
pub fn lap_trace(series: &EntitySeries, lap: u32, channel: Channel, config: &TraceConfig) -> LapTrace {
    let mut points: Vec<TracePoint> = series
        .samples_on_lap(lap)
        .filter(|s| s.rel_s.is_finite())
        .map(|s| TracePoint {
            rel_s: s.rel_s,
            value: s.value(channel),
        })
        .filter(|p| p.value.is_finite())
        .collect();
    points.sort_by(|a, b| a.rel_s.total_cmp(&b.rel_s));

    let (min, max) = points
        .iter()
        .fold((0.0_f64, 0.0_f64), |(lo, hi), p| (lo.min(p.value), hi.max(p.value)));
    let y_scale = min.abs().max(max.abs()).max(config.min_y_scale);

    LapTrace {
        lap,
        channel,
        points,
        y_scale,
    }
}

/// Time-delta trace of `lap`.
pub fn delta_trace(series: &EntitySeries, lap: u32) -> LapTrace {
    lap_trace(series, lap, Channel::Delta, &TraceConfig::DELTA)
}

/// Steering-angle trace of `lap`.
pub fn steering_trace(series: &EntitySeries, lap: u32) -> LapTrace {
    lap_trace(series, lap, Channel::Steer, &TraceConfig::STEERING)
}

// ============================================================================
// HEATMAP
// ============================================================================

/// Anchor colors of the acceleration heatmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatPalette {
    /// Color at zero acceleration
    pub neutral: Rgb,
    /// Color at +scale (accelerating)
    pub accelerating: Rgb,
    /// Color at -scale (braking)
    pub decelerating: Rgb,
    /// Color for unknown values
    pub missing: Rgb,
}

impl Default for HeatPalette {
    fn default() -> Self {
        Self {
            neutral: Rgb::new(0xff, 0xd1, 0x66),
            accelerating: Rgb::new(0x7b, 0xd3, 0x89),
            decelerating: Rgb::new(0xff, 0x6b, 0x6b),
            missing: Rgb::new(0x80, 0x80, 0x80),
        }
    }
}

impl HeatPalette {
    /// Color of a signed acceleration against a positive `scale`.
    ///
    /// The value is normalized to [-1, 1]; its magnitude blends from the
    /// neutral anchor toward the branch anchor of its sign.
    pub fn color(&self, value: f64, scale: f64) -> Rgb {
        if !value.is_finite() {
            return self.missing;
        }
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        let norm = (value / scale).clamp(-1.0, 1.0);
        if norm >= 0.0 {
            self.neutral.lerp(&self.accelerating, norm)
        } else {
            self.neutral.lerp(&self.decelerating, -norm)
        }
    }
}

/// Heatmap color with the default palette.
pub fn heat_color(value: f64, scale: f64) -> Rgb {
    HeatPalette::default().color(value, scale)
}

/// Track segment between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatSegment {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
    /// Mean longitudinal acceleration of the two endpoints (m/s²)
    pub accel: f64,
}

/// Segments between consecutive samples, optionally restricted to one lap.
pub fn heatmap_segments(series: &EntitySeries, lap: Option<u32>) -> Vec<HeatSegment> {
    let on_lap = |s: &Sample| lap.map_or(true, |l| s.lap == l);
    series
        .samples
        .windows(2)
        .filter(|w| on_lap(&w[0]) && on_lap(&w[1]))
        .map(|w| HeatSegment {
            start: w[0].position,
            end: w[1].position,
            accel: (w[0].accel_long + w[1].accel_long) / 2.0,
        })
        .collect()
}

/// Colored heatmap segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColoredSegment {
    pub segment: HeatSegment,
    pub color: Rgb,
}

/// Colored heatmap for one car.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    /// Robust |accel| scale the colors are normalized against
    pub scale: f64,
    pub segments: Vec<ColoredSegment>,
}

impl Heatmap {
    /// Builds the heatmap of `series` (optionally one lap).
    pub fn build(series: &EntitySeries, lap: Option<u32>, palette: &HeatPalette) -> Self {
        let segments = heatmap_segments(series, lap);
        let scale = robust_scale(segments.iter().map(|s| s.accel), &ScaleSpec::HEATMAP);
        let segments = segments
            .into_iter()
            .map(|segment| ColoredSegment {
                color: palette.color(segment.accel, scale),
                segment,
            })
            .collect();
        Self { scale, segments }
    }
}

// ============================================================================
// OVERLAY SNAPSHOT
// ============================================================================

/// Everything the heavier overlay refresh produces for the selected car.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySnapshot {
    pub time: f64,
    pub entity: usize,
    pub readout: LiveReadout,
    pub delta: LapTrace,
    pub steering: LapTrace,
}

impl OverlaySnapshot {
    /// Overlays of the view's selected car at `t`.
    ///
    /// `None` when no car is selected or it has no data. The current lap is
    /// the lap of the car's interpolated state at `t`.
    pub fn compute(
        store: &SeriesStore,
        view: &ViewState,
        cursors: &mut CursorSet,
        t: f64,
    ) -> Option<Self> {
        let entity = view.selected_entity?;
        let series = store.entity(entity)?;
        let state = cursors.sample(store, entity, t)?;

        Some(Self {
            time: t,
            entity,
            readout: LiveReadout::from_sample(&state, view.unit),
            delta: delta_trace(series, state.lap),
            steering: steering_trace(series, state.lap),
        })
    }
}
