//! Live readouts, view state and lap-table formatting.
//!
//! Everything a UI needs to show numbers for the current playhead. Unit
//! conversions happen here and only here: the store keeps accelerations in
//! m/s² and yaw rate in rad/s.

use crate::store::{Channel, Event, EventKind, Sample, SeriesStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Standard gravity used for g-force readouts (m/s²).
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Unit for speed readouts and the speed gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Mph,
    Kmh,
}

impl SpeedUnit {
    /// Channel carrying speed in this unit.
    pub fn channel(&self) -> Channel {
        match self {
            SpeedUnit::Mph => Channel::SpeedMph,
            SpeedUnit::Kmh => Channel::SpeedKmh,
        }
    }

    /// Lowest upper bound the speed gauge may use.
    pub fn gauge_floor(&self) -> f64 {
        match self {
            SpeedUnit::Mph => 60.0,
            SpeedUnit::Kmh => 100.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeedUnit::Mph => "mph",
            SpeedUnit::Kmh => "km/h",
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SpeedUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mph" => Ok(SpeedUnit::Mph),
            "kmh" | "km/h" | "kph" => Ok(SpeedUnit::Kmh),
            other => Err(format!("Unknown speed unit: {} (expected mph or kmh)", other)),
        }
    }
}

// ============================================================================
// VIEW STATE
// ============================================================================

/// Which event kinds a view shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    Only(HashSet<EventKind>),
}

impl EventFilter {
    pub fn allows(&self, kind: &EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(kinds) => kinds.contains(kind),
        }
    }
}

/// Per-view session state handed to overlay and readout functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub unit: SpeedUnit,
    /// Car the overlays and readouts follow
    pub selected_entity: Option<usize>,
    pub event_filter: EventFilter,
}

impl ViewState {
    pub fn new(unit: SpeedUnit) -> Self {
        Self {
            unit,
            ..Default::default()
        }
    }

    pub fn with_selected(mut self, entity: usize) -> Self {
        self.selected_entity = Some(entity);
        self
    }

    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.event_filter = filter;
        self
    }

    /// Events passing the filter, optionally only those up to time `until`.
    pub fn visible_events<'a>(&self, store: &'a SeriesStore, until: Option<f64>) -> Vec<&'a Event> {
        store
            .events()
            .iter()
            .filter(|e| until.map_or(true, |t| e.time <= t))
            .filter(|e| self.event_filter.allows(&e.kind))
            .collect()
    }
}

// ============================================================================
// LIVE READOUT
// ============================================================================

/// Human-unit readout of one car at the playhead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveReadout {
    pub time: f64,
    pub lap: u32,
    pub speed: f64,
    pub unit: SpeedUnit,
    pub gear: Option<i32>,
    pub throttle_pct: f64,
    pub brake_pct: f64,
    pub long_g: f64,
    pub lat_g: f64,
    pub yaw_deg_s: f64,
    pub steer: f64,
    pub delta: f64,
}

impl LiveReadout {
    pub fn from_sample(sample: &Sample, unit: SpeedUnit) -> Self {
        Self {
            time: sample.time,
            lap: sample.lap,
            speed: sample.value(unit.channel()),
            unit,
            gear: sample.gear.is_finite().then(|| sample.gear.round() as i32),
            throttle_pct: sample.throttle * 100.0,
            brake_pct: sample.brake * 100.0,
            long_g: sample.accel_long / STANDARD_GRAVITY,
            lat_g: sample.accel_lat / STANDARD_GRAVITY,
            yaw_deg_s: sample.yaw_rate.to_degrees(),
            steer: sample.steer,
            delta: sample.delta,
        }
    }
}

// ============================================================================
// LAP TABLE FORMATTING
// ============================================================================

/// `m:ss.mmm`, or `-` when unknown.
pub fn format_lap_time(t: f64) -> String {
    if !t.is_finite() {
        return "-".to_string();
    }
    let sign = if t < 0.0 { "-" } else { "" };
    let t = t.abs();
    let secs = t.floor();
    let millis = ((t - secs) * 1000.0).floor() as u64;
    let secs = secs as u64;
    format!("{}{}:{:02}.{:03}", sign, secs / 60, secs % 60, millis)
}

/// Signed sector delta with three decimals, `0` for exactly even, empty when unknown.
pub fn format_delta(d: f64) -> String {
    if !d.is_finite() {
        return String::new();
    }
    if d == 0.0 {
        return "0".to_string();
    }
    format!("{:+.3}", d)
}

/// Coloring class of a delta value (positive = behind the reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaClass {
    Faster,
    Slower,
    Even,
}

impl DeltaClass {
    pub fn of(d: f64) -> Self {
        if !d.is_finite() || d == 0.0 {
            DeltaClass::Even
        } else if d > 0.0 {
            DeltaClass::Slower
        } else {
            DeltaClass::Faster
        }
    }
}
