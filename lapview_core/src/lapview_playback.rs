//! The "PLAYBACK" Engine - frame-budgeted playback clock
//!
//! `PlaybackClock` owns the playhead. It is driven by one callback per
//! display refresh (`tick`) and by user actions (`toggle_play`, `seek`):
//!
//! ```text
//!            toggle_play
//!   Paused ─────────────► Playing ──┐ tick: elapsed < budget → skip
//!     ▲  ◄───────────────   │  ▲    │ tick: advance by elapsed, notify
//!     │   toggle_play/seek  │  └────┘
//!     └─────────────────────┘ tick reaches max_time (clamped, paused)
//! ```
//!
//! A seek always pauses before it moves the playhead, so a tick can never
//! observe a half-applied seek. Every advance or seek produces a
//! `TimeUpdate`; a subset of them (at most one per overlay interval, and
//! always on seeks) also asks for the heavier overlay recomputation.
//!
//! `PlaybackDriver` wraps a clock with a `ReplayContext` time source and
//! listener lists, so the same loop runs on the wall clock or on virtual
//! time in tests.

use crate::store::{Event, SeriesStore};
use lapview_env::ReplayContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Playback cadence configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Minimum wall-clock spacing between advances (default: 1000/45 ms)
    pub frame_budget_ms: f64,

    /// Minimum spacing between overlay notifications during playback (default: 100 ms)
    pub overlay_interval_ms: f64,

    /// Display refresh rate the driver schedules at (default: 60 Hz)
    pub refresh_hz: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 1000.0 / 45.0,
            overlay_interval_ms: 100.0,
            refresh_hz: 60.0,
        }
    }
}

impl PlaybackConfig {
    /// Caps the effective update rate at `fps`.
    pub fn with_max_fps(mut self, fps: f64) -> Self {
        self.frame_budget_ms = if fps > 0.0 { 1000.0 / fps } else { 0.0 };
        self
    }

    pub fn with_refresh_hz(mut self, hz: f64) -> Self {
        self.refresh_hz = hz;
        self
    }

    pub fn with_overlay_interval_ms(mut self, ms: f64) -> Self {
        self.overlay_interval_ms = ms;
        self
    }

    /// Time between two display refresh callbacks (at least 1 ms).
    pub fn refresh_interval(&self) -> Duration {
        let hz = if self.refresh_hz.is_finite() {
            self.refresh_hz.clamp(1.0, 1000.0)
        } else {
            60.0
        };
        Duration::from_secs_f64(1.0 / hz)
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// Play state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayState {
    Paused,
    Playing,
}

/// What moved the playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    Tick,
    Seek,
}

/// Notification that the playhead moved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeUpdate {
    /// New playhead time (seconds)
    pub time: f64,
    pub source: UpdateSource,
    /// The overlay recomputation should run for this update
    pub overlays: bool,
    /// Playback hit `max_time` and paused
    pub reached_end: bool,
}

/// Result of one refresh callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing; the callback chain ends.
    Stopped,
    /// Under the frame budget; nothing changed.
    Skipped,
    /// The playhead advanced.
    Advanced(TimeUpdate),
}

impl TickOutcome {
    /// Whether the refresh callback should schedule itself again.
    pub fn should_reschedule(&self) -> bool {
        match self {
            TickOutcome::Stopped => false,
            TickOutcome::Skipped => true,
            TickOutcome::Advanced(update) => !update.reached_end,
        }
    }
}

/// The shared playhead.
///
/// Invariant: `0 <= current_time <= max_time`.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    config: PlaybackConfig,
    current_time: f64,
    max_time: f64,
    state: PlayState,
    /// Wall-clock ms of the last accepted tick (or of pressing play)
    last_tick_ms: f64,
    /// Wall-clock ms of the last overlay notification
    last_overlay_ms: Option<f64>,
}

impl PlaybackClock {
    /// A paused clock at time 0 over `[0, max_time]`.
    pub fn new(max_time: f64, config: PlaybackConfig) -> Self {
        Self {
            config,
            current_time: 0.0,
            max_time: sanitize_max(max_time),
            state: PlayState::Paused,
            last_tick_ms: 0.0,
            last_overlay_ms: None,
        }
    }

    /// A paused clock spanning `store`.
    pub fn for_store(store: &SeriesStore, config: PlaybackConfig) -> Self {
        Self::new(store.max_time(), config)
    }

    /// Rewinds to 0 over a new time range (new dataset load).
    pub fn reset(&mut self, max_time: f64) {
        self.max_time = sanitize_max(max_time);
        self.current_time = 0.0;
        self.state = PlayState::Paused;
        self.last_overlay_ms = None;
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Flips between paused and playing.
    ///
    /// Starting playback stamps `now_ms` as the reference for the next
    /// tick's elapsed time.
    pub fn toggle_play(&mut self, now_ms: f64) -> PlayState {
        match self.state {
            PlayState::Playing => self.pause(),
            PlayState::Paused => {
                self.state = PlayState::Playing;
                self.last_tick_ms = now_ms;
                debug!("Playback started at t={:.3}s", self.current_time);
            }
        }
        self.state
    }

    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            debug!("Playback paused at t={:.3}s", self.current_time);
        }
        self.state = PlayState::Paused;
    }

    /// Moves the playhead to `t` (clamped), pausing first.
    ///
    /// Always requests an overlay refresh. A `NaN` target keeps the current
    /// time.
    pub fn seek(&mut self, t: f64, now_ms: f64) -> TimeUpdate {
        self.pause();
        if !t.is_nan() {
            self.current_time = t.clamp(0.0, self.max_time);
        }
        self.last_overlay_ms = Some(now_ms);
        TimeUpdate {
            time: self.current_time,
            source: UpdateSource::Seek,
            overlays: true,
            reached_end: false,
        }
    }

    /// One display refresh at wall-clock `now_ms`.
    pub fn tick(&mut self, now_ms: f64) -> TickOutcome {
        if self.state != PlayState::Playing {
            return TickOutcome::Stopped;
        }

        let elapsed_ms = now_ms - self.last_tick_ms;
        if !(elapsed_ms >= self.config.frame_budget_ms) {
            return TickOutcome::Skipped;
        }
        self.last_tick_ms = now_ms;

        let next = self.current_time + elapsed_ms / 1000.0;
        self.current_time = next.clamp(0.0, self.max_time);

        let reached_end = self.current_time >= self.max_time;
        if reached_end {
            self.state = PlayState::Paused;
            info!("Playback reached end at t={:.3}s", self.current_time);
        }

        let overlays = reached_end || self.overlay_due(now_ms);
        if overlays {
            self.last_overlay_ms = Some(now_ms);
        }

        TickOutcome::Advanced(TimeUpdate {
            time: self.current_time,
            source: UpdateSource::Tick,
            overlays,
            reached_end,
        })
    }

    fn overlay_due(&self, now_ms: f64) -> bool {
        match self.last_overlay_ms {
            None => true,
            Some(last) => now_ms - last >= self.config.overlay_interval_ms,
        }
    }
}

fn sanitize_max(max_time: f64) -> f64 {
    if max_time.is_finite() {
        max_time.max(0.0)
    } else {
        0.0
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Counters collected by a driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    /// Refresh callbacks executed
    pub refreshes: u64,
    /// Refreshes that advanced the playhead
    pub frames_advanced: u64,
    /// Refreshes skipped by the frame budget
    pub frames_skipped: u64,
    /// Overlay notifications dispatched (ticks and seeks)
    pub overlay_refreshes: u64,
    /// Seeks performed
    pub seeks: u64,
}

type Listener = Box<dyn FnMut(&TimeUpdate)>;

/// Refresh-callback scheduler around a `PlaybackClock`.
///
/// Frame listeners (`on_tick`) run for every time update; overlay listeners
/// (`on_overlay`) only for updates flagged `overlays`. Everything runs on the
/// caller's task: no threads, no locks.
pub struct PlaybackDriver<C: ReplayContext> {
    ctx: Arc<C>,
    clock: PlaybackClock,
    frame_listeners: Vec<Listener>,
    overlay_listeners: Vec<Listener>,
    stats: DriverStats,
}

impl<C: ReplayContext> PlaybackDriver<C> {
    pub fn new(ctx: Arc<C>, clock: PlaybackClock) -> Self {
        Self {
            ctx,
            clock,
            frame_listeners: Vec::new(),
            overlay_listeners: Vec::new(),
            stats: DriverStats::default(),
        }
    }

    /// Registers a per-frame listener.
    pub fn on_tick<F>(&mut self, listener: F)
    where
        F: FnMut(&TimeUpdate) + 'static,
    {
        self.frame_listeners.push(Box::new(listener));
    }

    /// Registers a throttled overlay listener.
    pub fn on_overlay<F>(&mut self, listener: F)
    where
        F: FnMut(&TimeUpdate) + 'static,
    {
        self.overlay_listeners.push(Box::new(listener));
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn context(&self) -> &Arc<C> {
        &self.ctx
    }

    pub fn toggle_play(&mut self) -> PlayState {
        let now = self.ctx.now_ms();
        self.clock.toggle_play(now)
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    /// Seeks and notifies all listeners.
    pub fn seek(&mut self, t: f64) -> TimeUpdate {
        let now = self.ctx.now_ms();
        let update = self.clock.seek(t, now);
        self.stats.seeks += 1;
        self.dispatch(&update);
        update
    }

    /// Jumps to an event marker (event list selection).
    pub fn seek_to_event(&mut self, event: &Event) -> TimeUpdate {
        debug!("Seeking to {} event at t={:.2}s", event.kind, event.time);
        self.seek(event.time)
    }

    /// Replaces the time range (new dataset load); paused at 0.
    pub fn reset(&mut self, max_time: f64) {
        self.clock.reset(max_time);
    }

    /// One display refresh callback.
    pub fn refresh(&mut self) -> TickOutcome {
        let outcome = self.clock.tick(self.ctx.now_ms());
        self.stats.refreshes += 1;
        match &outcome {
            TickOutcome::Advanced(update) => {
                self.stats.frames_advanced += 1;
                let update = *update;
                self.dispatch(&update);
            }
            TickOutcome::Skipped => self.stats.frames_skipped += 1,
            TickOutcome::Stopped => {}
        }
        outcome
    }

    /// Runs the self-rescheduling refresh loop until playback pauses.
    ///
    /// Returns immediately when the clock is not playing.
    pub async fn run(&mut self) -> DriverStats {
        let interval = self.clock.config().refresh_interval();
        while self.clock.is_playing() {
            self.ctx.sleep(interval).await;
            if !self.refresh().should_reschedule() {
                break;
            }
        }
        self.stats
    }

    fn dispatch(&mut self, update: &TimeUpdate) {
        for listener in self.frame_listeners.iter_mut() {
            listener(update);
        }
        if update.overlays {
            self.stats.overlay_refreshes += 1;
            for listener in self.overlay_listeners.iter_mut() {
                listener(update);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lapview_env::VirtualContext;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn clock(max_time: f64) -> PlaybackClock {
        PlaybackClock::new(max_time, PlaybackConfig::default())
    }

    #[test]
    fn test_new_clock_is_paused_at_zero() {
        let c = clock(10.0);
        assert_eq!(c.state(), PlayState::Paused);
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(c.max_time(), 10.0);
    }

    #[test]
    fn test_toggle_play() {
        let mut c = clock(10.0);
        assert_eq!(c.toggle_play(0.0), PlayState::Playing);
        assert_eq!(c.toggle_play(5.0), PlayState::Paused);
    }

    #[test]
    fn test_tick_when_paused_stops() {
        let mut c = clock(10.0);
        assert_eq!(c.tick(100.0), TickOutcome::Stopped);
        assert!(!TickOutcome::Stopped.should_reschedule());
    }

    #[test]
    fn test_frame_budget_skips() {
        let mut c = clock(10.0);
        c.toggle_play(1000.0);

        assert_eq!(c.tick(1010.0), TickOutcome::Skipped);
        assert_eq!(c.current_time(), 0.0);

        // Skipped ticks do not reset the reference, so elapsed accumulates.
        match c.tick(1030.0) {
            TickOutcome::Advanced(u) => {
                assert_relative_eq!(u.time, 0.030, epsilon = 1e-12);
                assert_eq!(u.source, UpdateSource::Tick);
            }
            other => panic!("expected advance, got {:?}", other),
        }
    }

    #[test]
    fn test_terminal_playback_clamps_once() {
        let mut c = clock(1.0);
        c.toggle_play(0.0);
        c.tick(600.0);

        match c.tick(5000.0) {
            TickOutcome::Advanced(u) => {
                assert_eq!(u.time, 1.0);
                assert!(u.reached_end);
                assert!(u.overlays);
            }
            other => panic!("expected advance, got {:?}", other),
        }
        assert_eq!(c.state(), PlayState::Paused);
        assert_eq!(c.current_time(), 1.0);

        // Nothing further happens.
        assert_eq!(c.tick(10_000.0), TickOutcome::Stopped);
        assert_eq!(c.current_time(), 1.0);
    }

    #[test]
    fn test_seek_is_idempotent_and_pauses() {
        let mut c = clock(20.0);
        c.toggle_play(0.0);

        let a = c.seek(7.5, 10.0);
        assert_eq!(a.time, 7.5);
        assert_eq!(c.state(), PlayState::Paused);

        let b = c.seek(7.5, 11.0);
        assert_eq!(b.time, 7.5);
        assert_eq!(c.current_time(), 7.5);
        assert_eq!(c.state(), PlayState::Paused);
        assert!(a.overlays && b.overlays);
    }

    #[test]
    fn test_seek_clamps() {
        let mut c = clock(20.0);
        assert_eq!(c.seek(-3.0, 0.0).time, 0.0);
        assert_eq!(c.seek(99.0, 0.0).time, 20.0);
        assert_eq!(c.seek(f64::INFINITY, 0.0).time, 20.0);
        assert_eq!(c.seek(f64::NAN, 0.0).time, 20.0);
    }

    #[test]
    fn test_overlay_throttle() {
        let mut c = clock(100.0);
        c.toggle_play(0.0);

        let mut flags = Vec::new();
        for i in 1..=20 {
            if let TickOutcome::Advanced(u) = c.tick(i as f64 * 25.0) {
                flags.push(u.overlays);
            }
        }
        // First advance notifies, then every 100 ms (4 ticks of 25 ms).
        assert_eq!(flags.len(), 20);
        assert_eq!(flags.iter().filter(|f| **f).count(), 5);
        assert!(flags[0]);
        assert!(!flags[1]);
        assert!(flags[4]);
    }

    #[test]
    fn test_seek_resets_overlay_throttle() {
        let mut c = clock(100.0);
        c.seek(5.0, 0.0);
        c.toggle_play(0.0);
        // 50 ms after the seek: still inside the overlay interval.
        match c.tick(50.0) {
            TickOutcome::Advanced(u) => assert!(!u.overlays),
            other => panic!("expected advance, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_length_session() {
        let mut c = clock(0.0);
        c.toggle_play(0.0);
        match c.tick(100.0) {
            TickOutcome::Advanced(u) => assert!(u.reached_end && u.time == 0.0),
            other => panic!("expected advance, got {:?}", other),
        }
    }

    #[test]
    fn test_reset() {
        let mut c = clock(10.0);
        c.seek(4.0, 0.0);
        c.toggle_play(0.0);
        c.reset(3.0);
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(c.max_time(), 3.0);
        assert!(!c.is_playing());
    }

    #[test]
    fn test_refresh_interval() {
        let cfg = PlaybackConfig::default();
        assert_relative_eq!(cfg.refresh_interval().as_secs_f64(), 1.0 / 60.0, epsilon = 1e-9);
        assert_relative_eq!(cfg.frame_budget_ms, 22.222, epsilon = 1e-3);
        assert_eq!(cfg.with_max_fps(0.0).frame_budget_ms, 0.0);
    }

    #[tokio::test]
    async fn test_driver_runs_to_end_on_virtual_time() {
        let ctx = VirtualContext::shared();
        let mut driver = PlaybackDriver::new(ctx.clone(), clock(2.0));

        let frames = Rc::new(RefCell::new(Vec::new()));
        let overlays = Rc::new(RefCell::new(0u32));
        {
            let frames = frames.clone();
            driver.on_tick(move |u| frames.borrow_mut().push(u.time));
        }
        {
            let overlays = overlays.clone();
            driver.on_overlay(move |_| *overlays.borrow_mut() += 1);
        }

        driver.toggle_play();
        let stats = driver.run().await;

        let frames = frames.borrow();
        assert_eq!(*frames.last().unwrap(), 2.0);
        assert!(frames.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(driver.clock().state(), PlayState::Paused);

        // 60 Hz refresh with a 22.2 ms budget advances every other refresh.
        assert!(stats.frames_skipped > 0);
        assert_eq!(stats.frames_advanced as usize, frames.len());
        assert!(stats.frames_advanced <= stats.refreshes / 2 + 1);
        assert_eq!(stats.overlay_refreshes as u32, *overlays.borrow());
        assert!(ctx.now() >= Duration::from_millis(1990));
    }

    #[tokio::test]
    async fn test_driver_seek_notifies_and_run_is_noop_when_paused() {
        let ctx = VirtualContext::shared();
        let mut driver = PlaybackDriver::new(ctx, clock(10.0));

        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            driver.on_overlay(move |u| seen.borrow_mut().push((u.time, u.source)));
        }

        driver.seek(4.0);
        let stats = driver.run().await;

        assert_eq!(*seen.borrow(), vec![(4.0, UpdateSource::Seek)]);
        assert_eq!(stats.refreshes, 0);
        assert_eq!(stats.seeks, 1);
    }

    #[tokio::test]
    async fn test_driver_reset_rewinds_and_pauses() {
        let ctx = VirtualContext::shared();
        let mut driver = PlaybackDriver::new(ctx, clock(10.0));

        driver.seek(6.0);
        driver.toggle_play();
        driver.refresh();
        assert!(driver.clock().is_playing());

        driver.reset(4.0);
        assert_eq!(driver.clock().current_time(), 0.0);
        assert_eq!(driver.clock().max_time(), 4.0);
        assert_eq!(driver.clock().state(), PlayState::Paused);

        let stats = driver.run().await;
        assert_eq!(stats.refreshes, 1);
    }

    #[tokio::test]
    async fn test_seek_to_event_pauses_at_marker() {
        let store = SeriesStore::from_json_str(
            r#"{"master": [],
                "cars": [{"points": [{"time": 0, "masterX": 0, "masterY": 0},
                                     {"time": 8, "masterX": 1, "masterY": 0}]}],
                "events": [{"time": 5.5, "type": "crash"}, {"type": "reset"}]}"#,
        )
        .unwrap();
        let clock = PlaybackClock::for_store(&store, PlaybackConfig::default());
        let mut driver = PlaybackDriver::new(VirtualContext::shared(), clock);

        driver.toggle_play();
        let update = driver.seek_to_event(&store.events()[1]);
        assert_eq!(update.time, 5.5);
        assert_eq!(update.source, UpdateSource::Seek);
        assert!(update.overlays);
        assert!(!driver.clock().is_playing());

        // A marker recorded without a time sits at the start.
        let update = driver.seek_to_event(&store.events()[0]);
        assert_eq!(update.time, 0.0);
        assert_eq!(driver.stats().seeks, 2);
    }

    proptest! {
        #[test]
        fn prop_clock_stays_in_range(
            steps in prop::collection::vec((0.0f64..200.0, any::<bool>(), -5.0f64..30.0), 1..200),
            max_time in 0.0f64..20.0,
        ) {
            let mut c = clock(max_time);
            let mut now = 0.0;
            for (dt, seek, target) in steps {
                now += dt;
                if seek {
                    c.seek(target, now);
                    prop_assert!(!c.is_playing());
                } else if !c.is_playing() {
                    c.toggle_play(now);
                } else {
                    c.tick(now);
                }
                prop_assert!(c.current_time() >= 0.0);
                prop_assert!(c.current_time() <= c.max_time());
            }
        }
    }
}
