//! JSON exporter for replays.
//!
//! Bundles what a viewer would render for a session (track bounds, car
//! colors, lap table, event markers, heatmap scales) together with the
//! recorded frames and overlay refreshes of a replay.

use crate::runner::{OverlayRecord, ReplayFrame, ReplayOutcome};
use lapview_core::lapview_playback::DriverStats;
use lapview_core::overlay::{HeatPalette, Heatmap};
use lapview_core::palette::{entity_color, event_color, Rgb};
use lapview_core::readout::{format_delta, format_lap_time, DeltaClass};
use lapview_core::geometry::DEFAULT_PAD;
use lapview_core::{speed_gauge_max, Event, SeriesStore, SpeedUnit, TrackBounds};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Per-car metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EntityInfo {
    pub index: usize,
    pub source: String,
    pub color: Rgb,
    pub samples: usize,
    pub laps: Vec<u32>,
    /// Robust |accel| scale of the full-session heatmap
    pub heatmap_scale: f64,
    pub heatmap_segments: usize,
}

/// One formatted row of the lap table.
#[derive(Debug, Clone, Serialize)]
pub struct LapRow {
    pub entity: usize,
    pub lap: u32,
    pub lap_time: String,
    pub sectors: [String; 3],
    pub deltas: [String; 3],
    pub classes: [DeltaClass; 3],
}

/// Event marker.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub time: f64,
    pub kind: String,
    pub color: Rgb,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lap: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        Self {
            time: event.time,
            kind: event.kind.to_string(),
            color: event_color(&event.kind),
            x: event.position.x,
            y: event.position.y,
            lap: event.lap,
            source: event.source.clone(),
            note: event.note.clone(),
        }
    }
}

/// Complete replay export.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayExport {
    /// Data file or synthetic label
    pub source: String,

    /// Seed of a synthetic session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub unit: SpeedUnit,
    pub max_time: f64,
    pub final_time: f64,
    pub speed_gauge_max: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackBounds>,

    pub entities: Vec<EntityInfo>,
    pub lap_table: Vec<LapRow>,
    pub events: Vec<EventRecord>,
    pub stats: DriverStats,
    pub frames: Vec<ReplayFrame>,
    pub overlays: Vec<OverlayRecord>,
}

impl ReplayExport {
    /// Builds the export of `outcome` played over `store`.
    pub fn new(source: &str, seed: Option<u64>, store: &SeriesStore, unit: SpeedUnit, outcome: ReplayOutcome) -> Self {
        let palette = HeatPalette::default();

        let entities = store
            .entities()
            .iter()
            .enumerate()
            .map(|(index, series)| {
                let heatmap = Heatmap::build(series, None, &palette);
                EntityInfo {
                    index,
                    source: series.source.clone(),
                    color: entity_color(index),
                    samples: series.len(),
                    laps: series.laps(),
                    heatmap_scale: heatmap.scale,
                    heatmap_segments: heatmap.segments.len(),
                }
            })
            .collect();

        let lap_table = store
            .entities()
            .iter()
            .enumerate()
            .flat_map(|(entity, series)| {
                series.lap_times.iter().map(move |summary| LapRow {
                    entity,
                    lap: summary.lap,
                    lap_time: format_lap_time(summary.lap_time),
                    sectors: summary.sector_times.map(format_lap_time),
                    deltas: summary.sector_deltas.map(format_delta),
                    classes: summary.sector_deltas.map(DeltaClass::of),
                })
            })
            .collect();

        Self {
            source: source.to_string(),
            seed,
            unit,
            max_time: store.max_time(),
            final_time: outcome.final_time,
            speed_gauge_max: speed_gauge_max(store, unit),
            track: TrackBounds::from_path(store.reference_path(), DEFAULT_PAD),
            entities,
            lap_table,
            events: store.events().iter().map(EventRecord::from).collect(),
            stats: outcome.stats,
            frames: outcome.frames,
            overlays: outcome.overlays,
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate_store, SyntheticConfig};

    fn empty_outcome(max_time: f64) -> ReplayOutcome {
        ReplayOutcome {
            frames: Vec::new(),
            overlays: Vec::new(),
            stats: DriverStats::default(),
            final_time: max_time,
            max_time,
        }
    }

    #[test]
    fn test_export_contents() {
        let config = SyntheticConfig::default().with_cars(2).with_laps(2).with_sample_rate(5.0);
        let store = generate_store(&config).unwrap();
        let export = ReplayExport::new("synthetic", Some(42), &store, SpeedUnit::Kmh, empty_outcome(store.max_time()));

        assert_eq!(export.entities.len(), 2);
        assert_eq!(export.entities[0].color, entity_color(0));
        assert_eq!(export.entities[1].laps, vec![1, 2]);
        assert_eq!(export.lap_table.len(), 4);
        assert!(export.lap_table.iter().all(|row| row.lap_time.starts_with("1:")));
        assert!(export.speed_gauge_max >= 100.0);
        assert!(export.track.is_some());
        assert_eq!(export.events.len(), store.events().len());
    }

    #[test]
    fn test_write_and_read_back() {
        let store = SeriesStore::from_json_str(
            r#"{"master": [{"x": 0, "y": 0}, {"x": 10, "y": 5}],
                "cars": [{"points": [{"time": 0, "masterX": 0, "masterY": 0}]}],
                "events": [{"time": 0.5, "type": "Crash", "masterX": 1, "masterY": 2}]}"#,
        )
        .unwrap();
        let export = ReplayExport::new("inline", None, &store, SpeedUnit::Mph, empty_outcome(0.0));

        let path = std::env::temp_dir().join(format!("lapview_export_{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["source"], "inline");
        assert!(value.get("seed").is_none());
        assert_eq!(value["unit"], "mph");
        assert_eq!(value["entities"][0]["source"], "car 1");
        assert_eq!(value["events"][0]["kind"], "crash");
        assert_eq!(value["events"][0]["color"], "#ff6b6b");
        assert_eq!(value["speed_gauge_max"], 60.0);
    }
}
