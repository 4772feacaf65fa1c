//! The "TIME" Engine - Temporal Sampler
//!
//! Maps a continuous session time to an interpolated `Sample` for one car.
//!
//! Playback queries a series many times per second with slowly increasing
//! times. Each consumer therefore keeps a `Cursor` per series remembering the
//! last bracketing interval:
//! - **Fast path**: the query is at or a few samples past the cursor, walk
//!   forward (O(1) amortized during playback)
//! - **Slow path**: anything else (scrub backwards, big jump), binary search
//!   over the whole series (O(log n) once, then fast again)
//!
//! Both paths land on the same interval, so the cursor only changes the cost
//! of a query, never its answer.

use crate::store::{Channel, Sample, SeriesStore};

/// Maximum number of intervals the fast path walks before giving up and
/// binary searching instead.
pub const FAST_PATH_MAX_STEPS: usize = 16;

/// Lower bound on an interval's duration when computing alpha.
pub const MIN_SPAN: f64 = 1e-9;

/// Cached bracketing-interval index into one series.
///
/// At rest `index` is the last sample with `time <= ` the last query time,
/// clamped to `[0, len - 2]`. Series with fewer than two samples never
/// consult it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    slow_path_hits: u64,
}

impl Cursor {
    /// A fresh cursor at the start of the series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current interval start.
    pub fn index(&self) -> usize {
        self.index
    }

    /// How many queries needed a full binary search.
    pub fn slow_path_hits(&self) -> u64 {
        self.slow_path_hits
    }

    /// Forgets the cached interval.
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

/// Interpolated state of `series` at time `t`.
///
/// - empty series: `None`
/// - `t` at or before the first sample: the first sample verbatim, cursor reset
/// - `t` at or after the last sample: the last sample verbatim, cursor at `len - 2`
/// - otherwise: linear interpolation of every continuous channel between the
///   bracketing samples, step channels (`lap`, `gear`) from the earlier one
///
/// A `NaN` query time samples as the first sample.
pub fn sample_at(series: &[Sample], cursor: &mut Cursor, t: f64) -> Option<Sample> {
    let first = series.first()?;
    let last = series.last()?;

    if t.is_nan() || t <= first.time {
        cursor.index = 0;
        return Some(*first);
    }
    if t >= last.time {
        cursor.index = series.len().saturating_sub(2);
        return Some(*last);
    }

    // From here on first.time < t < last.time, hence len >= 2.
    let lo = locate(series, cursor, t);
    cursor.index = lo;

    let p1 = &series[lo];
    let p2 = &series[lo + 1];
    let span = (p2.time - p1.time).max(MIN_SPAN);
    let alpha = ((t - p1.time) / span).clamp(0.0, 1.0);

    Some(interpolate(p1, p2, t, alpha))
}

/// Single channel of `series` at time `t`.
pub fn sample_channel_at(
    series: &[Sample],
    cursor: &mut Cursor,
    t: f64,
    channel: Channel,
) -> Option<f64> {
    sample_at(series, cursor, t).map(|s| s.value(channel))
}

/// Finds `lo` with `series[lo].time <= t < series[lo + 1].time`.
///
/// Requires `series[0].time < t < series[len - 1].time`.
fn locate(series: &[Sample], cursor: &mut Cursor, t: f64) -> usize {
    let max_index = series.len() - 2;
    let start = cursor.index.min(max_index);

    if series[start].time <= t {
        let mut lo = start;
        let mut steps = 0;
        while series[lo + 1].time <= t {
            lo += 1;
            steps += 1;
            if steps > FAST_PATH_MAX_STEPS {
                break;
            }
        }
        if series[lo + 1].time > t {
            return lo;
        }
    }

    // Backward moves and long forward jumps.
    cursor.slow_path_hits += 1;
    let mut lo = 0;
    let mut hi = series.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if series[mid].time <= t {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

fn lerp(a: f64, b: f64, alpha: f64) -> f64 {
    a + (b - a) * alpha
}

fn interpolate(p1: &Sample, p2: &Sample, t: f64, alpha: f64) -> Sample {
    Sample {
        time: t,
        position: p1.position + (p2.position - p1.position) * alpha,
        rel_s: lerp(p1.rel_s, p2.rel_s, alpha),
        lap: p1.lap,
        speed_mph: lerp(p1.speed_mph, p2.speed_mph, alpha),
        speed_kmh: lerp(p1.speed_kmh, p2.speed_kmh, alpha),
        gear: p1.gear,
        throttle: lerp(p1.throttle, p2.throttle, alpha),
        brake: lerp(p1.brake, p2.brake, alpha),
        accel_long: lerp(p1.accel_long, p2.accel_long, alpha),
        accel_lat: lerp(p1.accel_lat, p2.accel_lat, alpha),
        yaw_rate: lerp(p1.yaw_rate, p2.yaw_rate, alpha),
        steer: lerp(p1.steer, p2.steer, alpha),
        delta: lerp(p1.delta, p2.delta, alpha),
    }
}

// ============================================================================
// CURSOR SETS
// ============================================================================

/// One cursor per car of one store, owned by one consumer.
///
/// The main playhead, a comparison view and the overlay recomputation each
/// hold their own set so they never invalidate each other's fast path. A set
/// used with a different store (new dataset load) drops its cursors and
/// starts over.
#[derive(Debug, Clone, Default)]
pub struct CursorSet {
    generation: u64,
    cursors: Vec<Cursor>,
}

impl CursorSet {
    /// Creates a cursor set sized for `store`.
    pub fn for_store(store: &SeriesStore) -> Self {
        Self {
            generation: store.generation(),
            cursors: vec![Cursor::new(); store.entity_count()],
        }
    }

    /// Store generation the cursors belong to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cursor(&self, entity: usize) -> Option<&Cursor> {
        self.cursors.get(entity)
    }

    /// Interpolated state of car `entity` at `t`.
    ///
    /// `None` if the car does not exist or has no samples.
    pub fn sample(&mut self, store: &SeriesStore, entity: usize, t: f64) -> Option<Sample> {
        self.sync(store);
        let series = store.entity(entity)?;
        let cursor = self.cursors.get_mut(entity)?;
        sample_at(&series.samples, cursor, t)
    }

    /// Single channel of car `entity` at `t`.
    pub fn sample_channel(
        &mut self,
        store: &SeriesStore,
        entity: usize,
        t: f64,
        channel: Channel,
    ) -> Option<f64> {
        self.sample(store, entity, t).map(|s| s.value(channel))
    }

    /// Interpolated state of every car at `t`, in entity order.
    pub fn sample_all(&mut self, store: &SeriesStore, t: f64) -> Vec<Option<Sample>> {
        self.sync(store);
        store
            .entities()
            .iter()
            .zip(self.cursors.iter_mut())
            .map(|(series, cursor)| sample_at(&series.samples, cursor, t))
            .collect()
    }

    fn sync(&mut self, store: &SeriesStore) {
        if self.generation != store.generation() || self.cursors.len() != store.entity_count() {
            *self = Self::for_store(store);
        }
    }
}
