//! The Series Store - immutable, validated telemetry for one session.
//!
//! A store is built once from a `SessionDocument` and never mutated. Loading a
//! new dataset means building a new store; every store gets a fresh
//! `generation`, which is how cursor sets notice that their cached indices
//! belong to data that no longer exists.

use crate::document::{CarDoc, EventDoc, LapTimeDoc, PointDoc, SessionDocument};
use crate::error::LoadError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// SAMPLES & CHANNELS
// ============================================================================

/// One time-stamped observation of one car.
///
/// Unknown channels are `NaN`. `lap` and `gear` are step channels: they are
/// never interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Session time in seconds
    pub time: f64,
    /// Position mapped onto the reference path
    pub position: Point2<f64>,
    /// Distance along the reference path since the start of the lap (m)
    pub rel_s: f64,
    pub lap: u32,
    pub speed_mph: f64,
    pub speed_kmh: f64,
    pub gear: f64,
    /// Throttle fraction [0, 1]
    pub throttle: f64,
    /// Brake fraction [0, 1]
    pub brake: f64,
    /// Longitudinal acceleration (m/s²)
    pub accel_long: f64,
    /// Lateral acceleration (m/s²)
    pub accel_lat: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate: f64,
    /// Steering angle
    pub steer: f64,
    /// Time delta vs. the reference lap at the same distance (s)
    pub delta: f64,
}

impl Sample {
    /// A sample at `time`/`position` with every channel unknown.
    pub fn at(time: f64, position: Point2<f64>) -> Self {
        Self {
            time,
            position,
            rel_s: f64::NAN,
            lap: 0,
            speed_mph: f64::NAN,
            speed_kmh: f64::NAN,
            gear: f64::NAN,
            throttle: f64::NAN,
            brake: f64::NAN,
            accel_long: f64::NAN,
            accel_lat: f64::NAN,
            yaw_rate: f64::NAN,
            steer: f64::NAN,
            delta: f64::NAN,
        }
    }

    /// Reads one channel.
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::X => self.position.x,
            Channel::Y => self.position.y,
            Channel::RelS => self.rel_s,
            Channel::Lap => self.lap as f64,
            Channel::SpeedMph => self.speed_mph,
            Channel::SpeedKmh => self.speed_kmh,
            Channel::Gear => self.gear,
            Channel::Throttle => self.throttle,
            Channel::Brake => self.brake,
            Channel::AccelLong => self.accel_long,
            Channel::AccelLat => self.accel_lat,
            Channel::YawRate => self.yaw_rate,
            Channel::Steer => self.steer,
            Channel::Delta => self.delta,
        }
    }
}

/// Channel selector used by consumers asking for a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    X,
    Y,
    RelS,
    Lap,
    SpeedMph,
    SpeedKmh,
    Gear,
    Throttle,
    Brake,
    AccelLong,
    AccelLat,
    YawRate,
    Steer,
    Delta,
}

impl Channel {
    /// Step channels hold the earlier sample's value across an interval.
    pub fn is_stepped(&self) -> bool {
        matches!(self, Channel::Lap | Channel::Gear)
    }
}

// ============================================================================
// EVENTS & LAP SUMMARIES
// ============================================================================

/// Event category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Crash,
    Collision,
    Reset,
    Surface,
    Overtake,
    /// Anything else the recorder emitted (`early_brake`, `late_brake`, ...)
    Other(String),
}

impl EventKind {
    /// Parses a recorded type string (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "crash" => EventKind::Crash,
            "collision" => EventKind::Collision,
            "reset" => EventKind::Reset,
            "surface" => EventKind::Surface,
            "overtake" => EventKind::Overtake,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Crash => "crash",
            EventKind::Collision => "collision",
            EventKind::Reset => "reset",
            EventKind::Surface => "surface",
            EventKind::Overtake => "overtake",
            EventKind::Other(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A discrete annotation on the session timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub time: f64,
    pub kind: EventKind,
    pub position: Point2<f64>,
    pub lap: Option<u32>,
    pub source: Option<String>,
    pub note: Option<String>,
}

/// Lap time with sector splits. Missing values are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LapSummary {
    pub lap: u32,
    pub lap_time: f64,
    pub sector_times: [f64; 3],
    pub sector_deltas: [f64; 3],
}

// ============================================================================
// ENTITY SERIES
// ============================================================================

/// One car's recording.
#[derive(Debug, Clone)]
pub struct EntitySeries {
    /// Display label
    pub source: String,
    /// Samples, non-decreasing in time
    pub samples: Vec<Sample>,
    pub lap_times: Vec<LapSummary>,
}

impl EntitySeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.samples.first().map(|s| s.time)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }

    /// Distinct lap numbers present in the samples, ascending.
    pub fn laps(&self) -> Vec<u32> {
        let mut laps: Vec<u32> = self.samples.iter().map(|s| s.lap).collect();
        laps.sort_unstable();
        laps.dedup();
        laps
    }

    /// Samples recorded on `lap`, in recording order.
    pub fn samples_on_lap(&self, lap: u32) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter().filter(move |s| s.lap == lap)
    }

    /// Lap summary for `lap`, if one was recorded.
    pub fn lap_summary(&self, lap: u32) -> Option<&LapSummary> {
        self.lap_times.iter().find(|l| l.lap == lap)
    }
}

// ============================================================================
// SERIES STORE
// ============================================================================

/// Immutable telemetry for a whole session.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    generation: u64,
    reference_path: Vec<Point2<f64>>,
    entities: Vec<EntitySeries>,
    events: Vec<Event>,
    max_time: f64,
}

impl SeriesStore {
    /// Validates a document and builds a store from it.
    ///
    /// Fails on the first structural problem in the reference path or the
    /// car series; nothing is partially loaded. Events and lap summaries
    /// are annotations and load with defaults for missing fields.
    pub fn load(doc: &SessionDocument) -> Result<Self, LoadError> {
        Self::build(doc).map_err(|e| {
            warn!("Rejected session document: {}", e);
            e
        })
    }

    fn build(doc: &SessionDocument) -> Result<Self, LoadError> {
        let master = doc.master.as_ref().ok_or_else(|| LoadError::missing("master"))?;

        let reference_path = master
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let x = require(p.x, || format!("master[{}].x", i))?;
                let y = require(p.y, || format!("master[{}].y", i))?;
                Ok(Point2::new(x, y))
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        let entities = doc
            .cars
            .iter()
            .enumerate()
            .map(|(i, car)| load_car(i, car))
            .collect::<Result<Vec<_>, LoadError>>()?;

        let mut events: Vec<Event> = doc.events.iter().map(load_event).collect();
        events.sort_by(|a, b| a.time.total_cmp(&b.time));

        Ok(Self::from_parts(reference_path, entities, events))
    }

    /// Parses JSON text and loads it.
    pub fn from_json_str(text: &str) -> Result<Self, LoadError> {
        let doc = SessionDocument::from_json_str(text).map_err(|e| {
            warn!("Rejected session document: {}", e);
            e
        })?;
        Self::load(&doc)
    }

    /// Builds a store from already validated parts.
    ///
    /// Callers must uphold the series invariant (finite, non-decreasing times).
    pub fn from_parts(
        reference_path: Vec<Point2<f64>>,
        entities: Vec<EntitySeries>,
        events: Vec<Event>,
    ) -> Self {
        let max_time = entities
            .iter()
            .filter_map(|e| e.last_time())
            .fold(0.0_f64, f64::max);
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);

        info!(
            "Loaded session: master ({} pts), {} cars, {} events, max_time={:.2}s",
            reference_path.len(),
            entities.len(),
            events.len(),
            max_time
        );
        for (i, e) in entities.iter().enumerate() {
            debug!("  car {} '{}': {} samples, {} laps", i, e.source, e.len(), e.lap_times.len());
        }

        Self {
            generation,
            reference_path,
            entities,
            events,
            max_time,
        }
    }

    /// Identity of this dataset load. Never shared between two stores.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reference_path(&self) -> &[Point2<f64>] {
        &self.reference_path
    }

    pub fn entities(&self) -> &[EntitySeries] {
        &self.entities
    }

    pub fn entity(&self, index: usize) -> Option<&EntitySeries> {
        self.entities.get(index)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All events, ordered by time.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events with `from <= time <= to`, ordered by time.
    pub fn events_in(&self, from: f64, to: f64) -> &[Event] {
        let start = self.events.partition_point(|e| e.time < from);
        let end = self.events.partition_point(|e| e.time <= to);
        &self.events[start..end.max(start)]
    }

    /// Largest last-sample time across all cars (0 when there is no data).
    pub fn max_time(&self) -> f64 {
        self.max_time
    }
}

/// Free-function form of [`SeriesStore::load`].
pub fn load_series_store(doc: &SessionDocument) -> Result<SeriesStore, LoadError> {
    SeriesStore::load(doc)
}

fn require<F>(value: Option<f64>, path: F) -> Result<f64, LoadError>
where
    F: FnOnce() -> String,
{
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(LoadError::malformed(path(), format!("expected a finite number, got {}", v))),
        None => Err(LoadError::missing(path())),
    }
}

fn optional(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

fn load_car(index: usize, car: &CarDoc) -> Result<EntitySeries, LoadError> {
    let source = car
        .source
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("car {}", index + 1));

    let mut samples = Vec::with_capacity(car.points.len());
    for (j, point) in car.points.iter().enumerate() {
        let sample = load_point(index, j, point)?;
        if let Some(prev) = samples.last().map(|s: &Sample| s.time) {
            if sample.time < prev {
                return Err(LoadError::malformed(
                    format!("cars[{}].points[{}].time", index, j),
                    format!("time goes backwards ({} after {})", sample.time, prev),
                ));
            }
        }
        samples.push(sample);
    }

    let lap_times = car.lap_times.iter().map(load_lap_time).collect();

    Ok(EntitySeries {
        source,
        samples,
        lap_times,
    })
}

fn load_point(car: usize, index: usize, p: &PointDoc) -> Result<Sample, LoadError> {
    let path = |field: &str| format!("cars[{}].points[{}].{}", car, index, field);

    let time = require(p.time, || path("time"))?;
    let x = require(p.master_x, || path("masterX"))?;
    let y = require(p.master_y, || path("masterY"))?;

    Ok(Sample {
        time,
        position: Point2::new(x, y),
        rel_s: optional(p.rel_s),
        lap: p.lap.unwrap_or(0),
        speed_mph: optional(p.speed_mph),
        speed_kmh: optional(p.speed_kmh),
        gear: optional(p.gear),
        throttle: optional(p.throttle),
        brake: optional(p.brake),
        accel_long: optional(p.accel_long),
        accel_lat: optional(p.accel_lat),
        yaw_rate: optional(p.yaw_rate),
        steer: optional(p.steer),
        delta: optional(p.delta),
    })
}

fn load_lap_time(lt: &LapTimeDoc) -> LapSummary {
    let lap = lt.lap.unwrap_or(0);

    let mut sector_times = [f64::NAN; 3];
    let mut sector_deltas = [f64::NAN; 3];
    for (slot, value) in sector_times.iter_mut().zip(&lt.sector_time) {
        *slot = optional(*value);
    }
    for (slot, value) in sector_deltas.iter_mut().zip(&lt.sector_delta) {
        *slot = optional(*value);
    }

    LapSummary {
        lap,
        lap_time: optional(lt.lap_time),
        sector_times,
        sector_deltas,
    }
}

// Markers without a usable time sit at the session start.
fn load_event(ev: &EventDoc) -> Event {
    Event {
        time: ev.time.filter(|t| t.is_finite()).unwrap_or(0.0),
        kind: EventKind::parse(ev.kind.as_deref().unwrap_or("")),
        position: Point2::new(optional(ev.master_x), optional(ev.master_y)),
        lap: ev.lap,
        source: ev.source.clone(),
        note: ev.note.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(time: f64, lap: u32) -> PointDoc {
        PointDoc {
            time: Some(time),
            master_x: Some(time * 10.0),
            master_y: Some(0.0),
            lap: Some(lap),
            speed_kmh: Some(100.0),
            ..Default::default()
        }
    }

    fn sample_document() -> SessionDocument {
        SessionDocument {
            master: Some(vec![
                crate::document::PathPointDoc { x: Some(0.0), y: Some(0.0) },
                crate::document::PathPointDoc { x: Some(100.0), y: Some(0.0) },
            ]),
            cars: vec![
                CarDoc {
                    source: Some("a.csv".into()),
                    points: vec![point(0.0, 1), point(1.0, 1), point(2.5, 2)],
                    lap_times: vec![LapTimeDoc {
                        lap: Some(1),
                        lap_time: Some(61.25),
                        sector_time: vec![Some(20.0), Some(21.0), Some(20.25), Some(99.0)],
                        sector_delta: vec![Some(-0.1)],
                    }],
                },
                CarDoc {
                    source: None,
                    points: vec![point(0.5, 1), point(4.0, 1)],
                    lap_times: vec![],
                },
                CarDoc::default(),
            ],
            events: vec![
                EventDoc { time: Some(3.0), kind: Some("Reset".into()), ..Default::default() },
                EventDoc { time: Some(1.0), kind: Some("crash".into()), ..Default::default() },
                EventDoc { time: Some(2.0), kind: Some("late_brake".into()), ..Default::default() },
            ],
        }
    }

    #[test]
    fn test_load_valid_document() {
        let store = SeriesStore::load(&sample_document()).unwrap();

        assert_eq!(store.reference_path().len(), 2);
        assert_eq!(store.entity_count(), 3);
        assert_eq!(store.entity(0).unwrap().len(), 3);
        assert!(store.entity(2).unwrap().is_empty());
        assert_eq!(store.max_time(), 4.0);
    }

    #[test]
    fn test_missing_channels_load_as_nan() {
        let store = SeriesStore::load(&sample_document()).unwrap();
        let s = store.entity(0).unwrap().samples[0];

        assert_eq!(s.speed_kmh, 100.0);
        assert!(s.speed_mph.is_nan());
        assert!(s.delta.is_nan());
        assert!(s.rel_s.is_nan());
    }

    #[test]
    fn test_default_source_label() {
        let store = SeriesStore::load(&sample_document()).unwrap();
        assert_eq!(store.entity(0).unwrap().source, "a.csv");
        assert_eq!(store.entity(1).unwrap().source, "car 2");
    }

    #[test]
    fn test_lap_summary_sectors_truncated_to_three() {
        let store = SeriesStore::load(&sample_document()).unwrap();
        let lap = store.entity(0).unwrap().lap_summary(1).unwrap();

        assert_eq!(lap.sector_times, [20.0, 21.0, 20.25]);
        assert_eq!(lap.sector_deltas[0], -0.1);
        assert!(lap.sector_deltas[1].is_nan());
    }

    #[test]
    fn test_events_sorted_and_parsed() {
        let store = SeriesStore::load(&sample_document()).unwrap();
        let kinds: Vec<_> = store.events().iter().map(|e| e.kind.clone()).collect();

        assert_eq!(
            kinds,
            vec![
                EventKind::Crash,
                EventKind::Other("late_brake".into()),
                EventKind::Reset,
            ]
        );
        assert_eq!(store.events_in(1.5, 3.0).len(), 2);
        assert!(store.events_in(5.0, 6.0).is_empty());
    }

    #[test]
    fn test_missing_master_is_malformed() {
        let mut doc = sample_document();
        doc.master = None;

        let err = SeriesStore::load(&doc).unwrap_err();
        assert!(matches!(err, LoadError::MalformedData { ref path, .. } if path == "master"));
    }

    #[test]
    fn test_missing_time_reports_path() {
        let mut doc = sample_document();
        doc.cars[1].points[1].time = None;

        match SeriesStore::load(&doc).unwrap_err() {
            LoadError::MalformedData { path, .. } => assert_eq!(path, "cars[1].points[1].time"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_backwards_time_is_malformed() {
        let mut doc = sample_document();
        doc.cars[0].points[2].time = Some(0.5);

        assert!(matches!(
            SeriesStore::load(&doc),
            Err(LoadError::MalformedData { .. })
        ));
    }

    #[test]
    fn test_incomplete_event_loads_with_defaults() {
        let mut doc = sample_document();
        doc.events[0].kind = None;
        doc.events[1].time = None;
        doc.events[2].time = Some(f64::NAN);

        let store = SeriesStore::load(&doc).unwrap();
        let events = store.events();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].time, 0.0);
        assert_eq!(events[1].time, 0.0);
        assert_eq!(events[2].time, 3.0);
        assert_eq!(events[2].kind, EventKind::Other(String::new()));
        assert_eq!(events[2].kind.as_str(), "");
    }

    #[test]
    fn test_event_only_document_loads() {
        let store = SeriesStore::from_json_str(r#"{"master": [], "events": [{"type": "crash"}]}"#).unwrap();

        assert_eq!(store.events().len(), 1);
        assert_eq!(store.events()[0].time, 0.0);
        assert_eq!(store.events()[0].kind, EventKind::Crash);
    }

    #[test]
    fn test_lap_summary_without_lap_defaults_to_zero() {
        let mut doc = sample_document();
        doc.cars[0].lap_times[0].lap = None;

        let store = SeriesStore::load(&doc).unwrap();
        let summary = store.entity(0).unwrap().lap_summary(0).unwrap();
        assert_eq!(summary.lap_time, 61.25);
    }

    #[test]
    fn test_generations_are_unique() {
        let a = SeriesStore::load(&sample_document()).unwrap();
        let b = SeriesStore::load(&sample_document()).unwrap();
        assert_ne!(a.generation(), b.generation());
    }

    #[test]
    fn test_max_time_never_negative() {
        let doc = SessionDocument {
            master: Some(vec![]),
            cars: vec![CarDoc {
                points: vec![point(-5.0, 0), point(-2.0, 0)],
                ..Default::default()
            }],
            events: vec![],
        };
        let store = SeriesStore::load(&doc).unwrap();
        assert_eq!(store.max_time(), 0.0);
    }

    #[test]
    fn test_laps_listing() {
        let store = SeriesStore::load(&sample_document()).unwrap();
        assert_eq!(store.entity(0).unwrap().laps(), vec![1, 2]);
        assert_eq!(store.entity(0).unwrap().samples_on_lap(1).count(), 2);
    }
}
