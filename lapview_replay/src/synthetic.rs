//! Seeded synthetic sessions.
//!
//! Produces a complete session document without a recorder: an elliptical
//! reference track, N cars with their own pace, every telemetry channel,
//! lap summaries with three sectors, and an event list (overtakes plus a few
//! random incidents). All entropy comes from one `u64` seed, so a seed
//! always yields the same session.

use crate::error::ReplayError;
use lapview_core::document::{CarDoc, EventDoc, LapTimeDoc, PathPointDoc, PointDoc, SessionDocument};
use lapview_core::SeriesStore;
use nalgebra::{Point2, Vector2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::{PI, TAU};

const MPS_TO_MPH: f64 = 2.236_936;
const MPS_TO_KMH: f64 = 3.6;
const WHEELBASE_M: f64 = 2.7;
const STEERING_RATIO: f64 = 15.0;

/// Nominal share of a lap spent in each sector.
const SECTOR_SPLITS: [f64; 3] = [0.34, 0.33, 0.33];

/// Event types scattered at random.
const INCIDENT_KINDS: [&str; 4] = ["late_brake", "surface", "early_brake", "reset"];

/// Configuration for a synthetic session.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Master seed
    pub seed: u64,

    /// Number of cars
    pub cars: usize,

    /// Laps per car
    pub laps: u32,

    /// Telemetry rate (Hz)
    pub sample_rate_hz: f64,

    /// Track half-length along x (m)
    pub semi_major: f64,

    /// Track half-width along y (m)
    pub semi_minor: f64,

    /// Points on the reference path
    pub path_points: usize,

    /// Lap time of the fastest car before jitter (s)
    pub base_lap_time: f64,

    /// Extra lap-time fraction per car index
    pub pace_spread: f64,

    /// Std-dev of per-lap and per-sector time fractions
    pub lap_jitter: f64,

    /// Std-dev of recorded position noise (m)
    pub position_noise_std: f64,

    /// Probability of one random incident per car and lap
    pub incident_rate: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cars: 4,
            laps: 3,
            sample_rate_hz: 20.0,
            semi_major: 600.0,
            semi_minor: 350.0,
            path_points: 720,
            base_lap_time: 62.0,
            pace_spread: 0.015,
            lap_jitter: 0.01,
            position_noise_std: 0.3,
            incident_rate: 0.15,
        }
    }
}

impl SyntheticConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cars(mut self, cars: usize) -> Self {
        self.cars = cars;
        self
    }

    pub fn with_laps(mut self, laps: u32) -> Self {
        self.laps = laps;
        self
    }

    pub fn with_sample_rate(mut self, hz: f64) -> Self {
        self.sample_rate_hz = hz;
        self
    }

    fn validate(&self) -> Result<(), ReplayError> {
        if self.cars == 0 || self.laps == 0 {
            return Err(ReplayError::config("synthetic session needs at least one car and one lap"));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ReplayError::config("sample_rate_hz must be > 0"));
        }
        if !(self.base_lap_time.is_finite() && self.base_lap_time > 0.0) {
            return Err(ReplayError::config("base_lap_time must be > 0"));
        }
        if !(self.semi_major > 0.0 && self.semi_minor > 0.0) {
            return Err(ReplayError::config("track axes must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.incident_rate) {
            return Err(ReplayError::config("incident_rate must be within [0, 1]"));
        }
        Ok(())
    }
}

// ============================================================================
// TRACK
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Track {
    a: f64,
    b: f64,
}

impl Track {
    fn point(&self, theta: f64) -> Point2<f64> {
        Point2::new(self.a * theta.cos(), self.b * theta.sin())
    }

    /// Ramanujan's approximation.
    fn perimeter(&self) -> f64 {
        let (a, b) = (self.a, self.b);
        PI * (3.0 * (a + b) - ((3.0 * a + b) * (a + 3.0 * b)).sqrt())
    }
}

/// Lap fraction to track angle, warped so speed varies around the lap.
fn warp(u: f64) -> f64 {
    TAU * u + 0.08 * (2.0 * TAU * u).sin()
}

fn wrap_angle(a: f64) -> f64 {
    (a + PI).rem_euclid(TAU) - PI
}

// ============================================================================
// LAP PLANS
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct LapPlan {
    lap: u32,
    start: f64,
    duration: f64,
    sectors: [f64; 3],
}

impl LapPlan {
    fn end(&self) -> f64 {
        self.start + self.duration
    }
}

fn plan_laps(config: &SyntheticConfig, car: usize, jitter: &Normal<f64>, rng: &mut ChaCha8Rng) -> Vec<LapPlan> {
    let pace = 1.0 + config.pace_spread * car as f64;
    let mut start = 0.0;
    (1..=config.laps)
        .map(|lap| {
            let duration = config.base_lap_time * pace * (1.0 + jitter.sample(rng)).max(0.5);
            let mut sectors = SECTOR_SPLITS.map(|w| w * (1.0 + jitter.sample(rng)).max(0.5));
            let sum: f64 = sectors.iter().sum();
            sectors.iter_mut().for_each(|s| *s *= duration / sum);

            let plan = LapPlan { lap, start, duration, sectors };
            start += duration;
            plan
        })
        .collect()
}

// ============================================================================
// CAR TRACES
// ============================================================================

/// Noise-free trajectory of one car on the shared time grid.
struct CarTrace {
    times: Vec<f64>,
    laps: Vec<u32>,
    /// Fraction of the current lap completed
    fractions: Vec<f64>,
    /// Seconds since the current lap started
    elapsed: Vec<f64>,
    positions: Vec<Point2<f64>>,
}

impl CarTrace {
    fn build(config: &SyntheticConfig, track: &Track, plans: &[LapPlan]) -> Self {
        let dt = 1.0 / config.sample_rate_hz;
        let total = plans.last().map_or(0.0, LapPlan::end);

        let mut times: Vec<f64> = (0..=(total / dt).floor() as usize)
            .map(|k| (k as f64 * dt).min(total))
            .collect();
        // Finish exactly at `total`; a tiny trailing interval is folded into the last one.
        let last = times.last().copied().unwrap_or(0.0);
        if last < total - 1e-9 {
            if total - last < dt * 0.5 && times.len() > 1 {
                let end = times.len() - 1;
                times[end] = total;
            } else {
                times.push(total);
            }
        }

        let mut trace = Self {
            laps: Vec::with_capacity(times.len()),
            fractions: Vec::with_capacity(times.len()),
            elapsed: Vec::with_capacity(times.len()),
            positions: Vec::with_capacity(times.len()),
            times: Vec::new(),
        };

        let mut idx = 0;
        for &t in &times {
            while idx + 1 < plans.len() && t >= plans[idx].end() {
                idx += 1;
            }
            let plan = &plans[idx];
            let elapsed = (t - plan.start).clamp(0.0, plan.duration);
            let u = elapsed / plan.duration;

            trace.laps.push(plan.lap);
            trace.fractions.push(u);
            trace.elapsed.push(elapsed);
            trace.positions.push(track.point(warp(u)));
        }
        trace.times = times;
        trace
    }

    fn len(&self) -> usize {
        self.times.len()
    }

    /// Laps completed, as a real number.
    fn progress(&self, k: usize) -> f64 {
        (self.laps[k] - 1) as f64 + self.fractions[k]
    }

    /// Central-difference neighbours of `k` and their time span.
    fn span(&self, k: usize) -> (usize, usize, f64) {
        let a = k.saturating_sub(1);
        let b = (k + 1).min(self.len() - 1);
        (a, b, self.times[b] - self.times[a])
    }

    fn to_points(
        &self,
        perimeter: f64,
        reference_lap_time: f64,
        noise: &Normal<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Vec<PointDoc> {
        let n = self.len();
        let velocity: Vec<Vector2<f64>> = (0..n)
            .map(|k| {
                let (a, b, dt) = self.span(k);
                if dt > 0.0 {
                    (self.positions[b] - self.positions[a]) / dt
                } else {
                    Vector2::zeros()
                }
            })
            .collect();
        let speed: Vec<f64> = velocity.iter().map(|v| v.norm()).collect();
        let heading: Vec<f64> = velocity.iter().map(|v| v.y.atan2(v.x)).collect();

        (0..n)
            .map(|k| {
                let (a, b, dt) = self.span(k);
                let (accel, yaw_rate) = if dt > 0.0 {
                    ((speed[b] - speed[a]) / dt, wrap_angle(heading[b] - heading[a]) / dt)
                } else {
                    (0.0, 0.0)
                };
                let v = speed[k];
                let curvature = if v > 0.0 { yaw_rate / v } else { 0.0 };
                let steer = (WHEELBASE_M * curvature).atan().to_degrees() * STEERING_RATIO;
                let p = self.positions[k];

                PointDoc {
                    time: Some(self.times[k]),
                    master_x: Some(p.x + noise.sample(rng)),
                    master_y: Some(p.y + noise.sample(rng)),
                    rel_s: Some(self.fractions[k] * perimeter),
                    lap: Some(self.laps[k]),
                    speed_mph: Some(v * MPS_TO_MPH),
                    speed_kmh: Some(v * MPS_TO_KMH),
                    gear: Some(gear_for(v)),
                    throttle: Some(if accel > 0.0 { (accel / 4.0).min(1.0) } else { 0.0 }),
                    brake: Some(if accel < -0.5 { (-accel / 8.0).min(1.0) } else { 0.0 }),
                    accel_long: Some(accel),
                    accel_lat: Some(v * yaw_rate),
                    yaw_rate: Some(yaw_rate),
                    steer: Some(steer),
                    delta: Some(self.elapsed[k] - self.fractions[k] * reference_lap_time),
                }
            })
            .collect()
    }
}

fn gear_for(speed_mps: f64) -> f64 {
    ((speed_mps / 11.0).floor() + 1.0).clamp(1.0, 6.0)
}

fn car_label(index: usize) -> String {
    format!("car_{:02}.csv", index + 1)
}

fn normal(std_dev: f64) -> Result<Normal<f64>, ReplayError> {
    Normal::new(0.0, std_dev).map_err(|e| ReplayError::config(format!("invalid noise std-dev {}: {}", std_dev, e)))
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Generates a session document from `config`.
pub fn generate(config: &SyntheticConfig) -> Result<SessionDocument, ReplayError> {
    config.validate()?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let jitter = normal(config.lap_jitter)?;
    let noise = normal(config.position_noise_std)?;
    let track = Track {
        a: config.semi_major,
        b: config.semi_minor,
    };
    let perimeter = track.perimeter();

    let master = (0..config.path_points)
        .map(|i| {
            let p = track.point(TAU * i as f64 / config.path_points as f64);
            PathPointDoc {
                x: Some(p.x),
                y: Some(p.y),
            }
        })
        .collect();

    let plans: Vec<Vec<LapPlan>> = (0..config.cars)
        .map(|car| plan_laps(config, car, &jitter, &mut rng))
        .collect();
    let best = plans
        .iter()
        .flatten()
        .copied()
        .min_by(|a, b| a.duration.total_cmp(&b.duration))
        .ok_or_else(|| ReplayError::config("no laps planned"))?;

    let traces: Vec<CarTrace> = plans.iter().map(|p| CarTrace::build(config, &track, p)).collect();

    let cars = plans
        .iter()
        .zip(&traces)
        .enumerate()
        .map(|(i, (plan, trace))| CarDoc {
            source: Some(car_label(i)),
            points: trace.to_points(perimeter, best.duration, &noise, &mut rng),
            lap_times: plan
                .iter()
                .map(|lap| LapTimeDoc {
                    lap: Some(lap.lap),
                    lap_time: Some(lap.duration),
                    sector_time: lap.sectors.iter().map(|s| Some(*s)).collect(),
                    sector_delta: lap
                        .sectors
                        .iter()
                        .zip(&best.sectors)
                        .map(|(s, b)| Some(s - b))
                        .collect(),
                })
                .collect(),
        })
        .collect();

    let mut events = overtakes(&traces);
    events.extend(incidents(config, &track, &plans, &mut rng));
    events.sort_by(|a, b| a.time.unwrap_or(0.0).total_cmp(&b.time.unwrap_or(0.0)));

    Ok(SessionDocument {
        master: Some(master),
        cars,
        events,
    })
}

/// Generates a session and loads it.
pub fn generate_store(config: &SyntheticConfig) -> Result<SeriesStore, ReplayError> {
    let doc = generate(config)?;
    Ok(SeriesStore::load(&doc)?)
}

/// Overtakes on the shared time grid: car `i` moving from behind car `j` to ahead.
fn overtakes(traces: &[CarTrace]) -> Vec<EventDoc> {
    // The last sample of each car sits at its own finish time, off the grid.
    let common = traces.iter().map(|t| t.len().saturating_sub(1)).min().unwrap_or(0);
    let mut events = Vec::new();

    for (i, car) in traces.iter().enumerate() {
        for (j, other) in traces.iter().enumerate() {
            if i == j {
                continue;
            }
            for k in 2..common {
                let was_behind = car.progress(k - 1) <= other.progress(k - 1);
                let now_ahead = car.progress(k) > other.progress(k);
                if was_behind && now_ahead {
                    let p = car.positions[k];
                    events.push(EventDoc {
                        time: Some(car.times[k]),
                        kind: Some("overtake".to_string()),
                        master_x: Some(p.x),
                        master_y: Some(p.y),
                        lap: Some(car.laps[k]),
                        source: Some(car_label(i)),
                        note: Some(format!("passes {}", car_label(j))),
                    });
                }
            }
        }
    }
    events
}

fn incidents(config: &SyntheticConfig, track: &Track, plans: &[Vec<LapPlan>], rng: &mut ChaCha8Rng) -> Vec<EventDoc> {
    let mut events = Vec::new();
    for (car, laps) in plans.iter().enumerate() {
        for lap in laps {
            if !rng.gen_bool(config.incident_rate) {
                continue;
            }
            let u = rng.gen_range(0.1..0.9);
            let kind = INCIDENT_KINDS[rng.gen_range(0..INCIDENT_KINDS.len())];
            let p = track.point(warp(u));
            events.push(EventDoc {
                time: Some(lap.start + u * lap.duration),
                kind: Some(kind.to_string()),
                master_x: Some(p.x),
                master_y: Some(p.y),
                lap: Some(lap.lap),
                source: Some(car_label(car)),
                note: None,
            });
        }
    }
    events
}
