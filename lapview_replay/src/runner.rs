//! Replay runner - plays a session headless and records what a viewer would show.
//!
//! The runner wires a `PlaybackDriver` to two listeners:
//! - the frame listener samples every car at each time update (one cursor set)
//! - the overlay listener recomputes the selected car's overlays at the
//!   throttled cadence (its own cursor set)
//!
//! On a `VirtualContext` a full session replays instantly and
//! deterministically; on a `SystemContext` it runs at wall-clock speed.

use crate::config::ReplayConfig;
use lapview_core::lapview_playback::{DriverStats, UpdateSource};
use lapview_core::{
    CursorSet, LiveReadout, OverlaySnapshot, PlaybackClock, PlaybackDriver, SeriesStore, TimeUpdate, ViewState,
};
use lapview_env::ReplayContext;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

/// Position of one car in a recorded frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CarPosition {
    pub entity: usize,
    pub x: f64,
    pub y: f64,
    pub lap: u32,
}

/// One recorded time update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayFrame {
    pub time: f64,
    pub source: UpdateSource,
    pub cars: Vec<CarPosition>,
    /// Readout of the selected car
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readout: Option<LiveReadout>,
}

/// Summary of one overlay recomputation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayRecord {
    pub time: f64,
    pub source: UpdateSource,
    pub entity: usize,
    pub lap: u32,
    pub delta_points: usize,
    pub delta_scale: f64,
    pub steering_points: usize,
    pub steering_scale: f64,
}

impl OverlayRecord {
    fn new(snapshot: &OverlaySnapshot, source: UpdateSource) -> Self {
        Self {
            time: snapshot.time,
            source,
            entity: snapshot.entity,
            lap: snapshot.readout.lap,
            delta_points: snapshot.delta.points.len(),
            delta_scale: snapshot.delta.y_scale,
            steering_points: snapshot.steering.points.len(),
            steering_scale: snapshot.steering.y_scale,
        }
    }
}

/// Result of a replay.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub frames: Vec<ReplayFrame>,
    pub overlays: Vec<OverlayRecord>,
    pub stats: DriverStats,
    /// Playhead when playback stopped
    pub final_time: f64,
    pub max_time: f64,
}

impl ReplayOutcome {
    pub fn reached_end(&self) -> bool {
        self.final_time >= self.max_time
    }
}

/// Listener state shared by the frame and overlay callbacks.
struct Recorder {
    store: Rc<SeriesStore>,
    view: ViewState,
    frame_cursors: CursorSet,
    overlay_cursors: CursorSet,
    stride: u64,
    log_interval: u64,
    ticks: u64,
    frames: Vec<ReplayFrame>,
    overlays: Vec<OverlayRecord>,
}

impl Recorder {
    fn new(store: Rc<SeriesStore>, config: &ReplayConfig) -> Self {
        let mut view = ViewState::new(config.unit);
        view.selected_entity = config.selected_entity;
        Self {
            frame_cursors: CursorSet::for_store(&store),
            overlay_cursors: CursorSet::for_store(&store),
            store,
            view,
            stride: config.export_stride.max(1) as u64,
            log_interval: config.log_interval,
            ticks: 0,
            frames: Vec::new(),
            overlays: Vec::new(),
        }
    }

    fn record_frame(&mut self, update: &TimeUpdate) {
        if update.source == UpdateSource::Tick {
            self.ticks += 1;
            if self.log_interval > 0 && self.ticks % self.log_interval == 0 {
                debug!(
                    "  t={:.1}s | frames={} | overlays={}",
                    update.time,
                    self.frames.len(),
                    self.overlays.len()
                );
            }
        }

        let keep = update.source == UpdateSource::Seek || update.reached_end || self.ticks % self.stride == 0;
        if !keep {
            return;
        }

        let cars = self
            .frame_cursors
            .sample_all(&self.store, update.time)
            .into_iter()
            .enumerate()
            .filter_map(|(entity, sample)| {
                sample.map(|s| CarPosition {
                    entity,
                    x: s.position.x,
                    y: s.position.y,
                    lap: s.lap,
                })
            })
            .collect();

        let readout = self.view.selected_entity.and_then(|entity| {
            self.frame_cursors
                .sample(&self.store, entity, update.time)
                .map(|s| LiveReadout::from_sample(&s, self.view.unit))
        });

        self.frames.push(ReplayFrame {
            time: update.time,
            source: update.source,
            cars,
            readout,
        });
    }

    fn record_overlay(&mut self, update: &TimeUpdate) {
        if let Some(snapshot) = OverlaySnapshot::compute(&self.store, &self.view, &mut self.overlay_cursors, update.time) {
            self.overlays.push(OverlayRecord::new(&snapshot, update.source));
        }
    }
}

/// Plays sessions headless on a given time source.
pub struct ReplayRunner<C: ReplayContext> {
    ctx: Arc<C>,
    config: ReplayConfig,
}

impl<C: ReplayContext> ReplayRunner<C> {
    pub fn new(ctx: Arc<C>, config: ReplayConfig) -> Self {
        Self { ctx, config }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Seeks to the configured start time and plays until the end.
    pub async fn run(&self, store: Rc<SeriesStore>) -> ReplayOutcome {
        let clock = PlaybackClock::for_store(&store, self.config.playback);
        let mut driver = PlaybackDriver::new(self.ctx.clone(), clock);
        let recorder = Rc::new(RefCell::new(Recorder::new(store.clone(), &self.config)));

        {
            let recorder = recorder.clone();
            driver.on_tick(move |update| recorder.borrow_mut().record_frame(update));
        }
        {
            let recorder = recorder.clone();
            driver.on_overlay(move |update| recorder.borrow_mut().record_overlay(update));
        }

        info!(
            "Replaying {} cars over {:.1}s (virtual={})",
            store.entity_count(),
            store.max_time(),
            self.ctx.is_virtual()
        );

        driver.seek(self.config.start_time);
        driver.toggle_play();
        let stats = driver.run().await;
        let final_time = driver.clock().current_time();
        drop(driver);

        let mut recorder = recorder.borrow_mut();
        let outcome = ReplayOutcome {
            frames: std::mem::take(&mut recorder.frames),
            overlays: std::mem::take(&mut recorder.overlays),
            stats,
            final_time,
            max_time: store.max_time(),
        };

        info!(
            "Replay finished at t={:.3}s: {} frames recorded, {} overlay refreshes",
            outcome.final_time,
            outcome.frames.len(),
            outcome.overlays.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate_store, SyntheticConfig};
    use lapview_env::VirtualContext;

    fn short_session() -> Rc<SeriesStore> {
        let mut config = SyntheticConfig::default().with_cars(2).with_laps(1).with_sample_rate(5.0);
        config.base_lap_time = 8.0;
        Rc::new(generate_store(&config).unwrap())
    }

    #[tokio::test]
    async fn test_replay_reaches_end() {
        let store = short_session();
        let runner = ReplayRunner::new(VirtualContext::shared(), ReplayConfig::default());
        let outcome = runner.run(store.clone()).await;

        assert!(outcome.reached_end());
        assert_eq!(outcome.final_time, store.max_time());

        let first = outcome.frames.first().unwrap();
        assert_eq!(first.source, UpdateSource::Seek);
        assert_eq!(first.time, 0.0);

        let last = outcome.frames.last().unwrap();
        assert_eq!(last.time, store.max_time());
        assert!(outcome.frames.iter().all(|f| f.cars.len() == 2));
        assert!(outcome.frames.windows(2).all(|w| w[0].time <= w[1].time));

        // Seek + every advanced frame
        assert_eq!(outcome.frames.len() as u64, outcome.stats.frames_advanced + 1);
    }

    #[tokio::test]
    async fn test_overlays_are_throttled() {
        let store = short_session();
        let runner = ReplayRunner::new(VirtualContext::shared(), ReplayConfig::default());
        let outcome = runner.run(store).await;

        assert_eq!(outcome.overlays[0].source, UpdateSource::Seek);
        assert!(outcome.overlays.len() < outcome.frames.len());
        assert_eq!(outcome.overlays.len() as u64, outcome.stats.overlay_refreshes);

        // The final frame always refreshes overlays.
        assert_eq!(outcome.overlays.last().unwrap().time, outcome.max_time);
        assert!(outcome.overlays.iter().all(|o| o.delta_scale >= 0.05));
    }

    #[tokio::test]
    async fn test_export_stride() {
        let store = short_session();
        let config = ReplayConfig::default().with_export_stride(10);
        let outcome = ReplayRunner::new(VirtualContext::shared(), config).run(store).await;

        let advanced = outcome.stats.frames_advanced;
        assert!((outcome.frames.len() as u64) < advanced);
        assert!(outcome.frames.len() as u64 >= advanced / 10);
        assert_eq!(outcome.frames.last().unwrap().time, outcome.max_time);
    }

    #[tokio::test]
    async fn test_start_time_and_no_selection() {
        let store = short_session();
        let mut config = ReplayConfig::default().with_start_time(store.max_time() - 1.0);
        config.selected_entity = None;

        let outcome = ReplayRunner::new(VirtualContext::shared(), config).run(store.clone()).await;

        assert_eq!(outcome.frames[0].time, store.max_time() - 1.0);
        assert!(outcome.frames.iter().all(|f| f.readout.is_none()));
        assert!(outcome.overlays.is_empty());
        assert!(outcome.reached_end());
    }

    #[tokio::test]
    async fn test_empty_session() {
        let store = Rc::new(SeriesStore::from_json_str(r#"{"master": []}"#).unwrap());
        let outcome = ReplayRunner::new(VirtualContext::shared(), ReplayConfig::default())
            .run(store)
            .await;

        assert_eq!(outcome.final_time, 0.0);
        assert!(outcome.frames.iter().all(|f| f.cars.is_empty()));
        assert!(outcome.overlays.is_empty());
        assert_eq!(outcome.stats.frames_advanced, 1);
    }
}
