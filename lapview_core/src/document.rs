//! Wire format of a recorded session.
//!
//! This is the document exactly as the recorder writes it: camelCase keys,
//! every field optional at the serde level. Requiredness is checked later by
//! `SeriesStore::load`, which can then report *where* a field is missing
//! instead of a bare serde error.

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// A complete recorded session: reference path, cars and events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Reference ("master") path of the track. Required, may be empty.
    pub master: Option<Vec<PathPointDoc>>,

    /// One entry per recorded car
    #[serde(default)]
    pub cars: Vec<CarDoc>,

    /// Discrete annotations (crashes, resets, overtakes, ...)
    #[serde(default)]
    pub events: Vec<EventDoc>,
}

/// One point of the reference path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathPointDoc {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// A car's recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarDoc {
    /// Label of the recording (usually its file name)
    pub source: Option<String>,

    #[serde(default)]
    pub points: Vec<PointDoc>,

    #[serde(default)]
    pub lap_times: Vec<LapTimeDoc>,
}

/// One telemetry sample as recorded.
///
/// `masterX`/`masterY` are the sample's position mapped onto the reference
/// path. Channels left out (or written as `null`) load as `NaN`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointDoc {
    pub time: Option<f64>,
    pub master_x: Option<f64>,
    pub master_y: Option<f64>,
    pub rel_s: Option<f64>,
    pub lap: Option<u32>,
    pub speed_mph: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub gear: Option<f64>,
    pub throttle: Option<f64>,
    pub brake: Option<f64>,
    pub accel_long: Option<f64>,
    pub accel_lat: Option<f64>,
    pub yaw_rate: Option<f64>,
    pub steer: Option<f64>,
    pub delta: Option<f64>,
}

/// Lap summary: total time plus up to three sectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapTimeDoc {
    pub lap: Option<u32>,
    pub lap_time: Option<f64>,
    #[serde(default)]
    pub sector_time: Vec<Option<f64>>,
    #[serde(default)]
    pub sector_delta: Vec<Option<f64>>,
}

/// A recorded event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    pub time: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub master_x: Option<f64>,
    pub master_y: Option<f64>,
    pub lap: Option<u32>,
    pub source: Option<String>,
    pub note: Option<String>,
}

impl SessionDocument {
    /// Parses a document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses a document from a reader (file, socket, ...).
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Serializes the document as pretty JSON.
    pub fn to_json_string(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
