//! Replay configuration.

use crate::error::ReplayError;
use lapview_core::{PlaybackConfig, SpeedUnit};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Configuration for a headless replay.
///
/// Every field has a default, so a config file only needs the keys it
/// changes. CLI flags are applied on top of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Clock cadence (frame budget, overlay throttle, refresh rate)
    pub playback: PlaybackConfig,

    /// Unit for speed readouts and the gauge
    pub unit: SpeedUnit,

    /// Car followed by readouts and overlays
    pub selected_entity: Option<usize>,

    /// Playhead position to start from (seconds)
    pub start_time: f64,

    /// Record every Nth advanced frame (the final frame is always kept)
    pub export_stride: usize,

    /// Log progress every N advanced frames
    pub log_interval: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            unit: SpeedUnit::Mph,
            selected_entity: Some(0),
            start_time: 0.0,
            export_stride: 1,
            log_interval: 300,
        }
    }
}

impl ReplayConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader)
            .map_err(|e| ReplayError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn with_unit(mut self, unit: SpeedUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_selected_entity(mut self, entity: usize) -> Self {
        self.selected_entity = Some(entity);
        self
    }

    pub fn with_start_time(mut self, t: f64) -> Self {
        self.start_time = t;
        self
    }

    pub fn with_export_stride(mut self, stride: usize) -> Self {
        self.export_stride = stride;
        self
    }

    /// Rejects values the replay loop cannot run with.
    pub fn validate(&self) -> Result<(), ReplayError> {
        let p = &self.playback;
        if !(p.frame_budget_ms.is_finite() && p.frame_budget_ms >= 0.0) {
            return Err(ReplayError::config("frame_budget_ms must be finite and >= 0"));
        }
        if !(p.overlay_interval_ms.is_finite() && p.overlay_interval_ms >= 0.0) {
            return Err(ReplayError::config("overlay_interval_ms must be finite and >= 0"));
        }
        if !(p.refresh_hz.is_finite() && p.refresh_hz > 0.0) {
            return Err(ReplayError::config("refresh_hz must be > 0"));
        }
        if !self.start_time.is_finite() {
            return Err(ReplayError::config("start_time must be finite"));
        }
        if self.export_stride == 0 {
            return Err(ReplayError::config("export_stride must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ReplayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.selected_entity, Some(0));
        assert_eq!(config.playback.overlay_interval_ms, 100.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ReplayConfig = serde_json::from_str(
            r#"{"unit": "kmh", "playback": {"refresh_hz": 120.0}, "export_stride": 5}"#,
        )
        .unwrap();
        assert_eq!(config.unit, SpeedUnit::Kmh);
        assert_eq!(config.playback.refresh_hz, 120.0);
        assert_eq!(config.playback.overlay_interval_ms, 100.0);
        assert_eq!(config.export_stride, 5);
        assert_eq!(config.start_time, 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ReplayConfig::default().with_export_stride(0).validate().is_err());
        assert!(ReplayConfig::default().with_start_time(f64::NAN).validate().is_err());

        let mut config = ReplayConfig::default();
        config.playback.refresh_hz = 0.0;
        assert!(matches!(config.validate(), Err(ReplayError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ReplayConfig::from_file("/nonexistent/lapview.json").unwrap_err();
        assert!(matches!(err, ReplayError::Io(_)));
    }
}
