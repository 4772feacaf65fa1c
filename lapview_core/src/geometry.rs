//! Reference-path bounds and viewport projection.

use nalgebra::{Point2, Vector2};
use serde::Serialize;

/// Default padding around the reference path (track units).
pub const DEFAULT_PAD: f64 = 100.0;

/// Fraction of the viewport the track may fill.
const FILL: f64 = 0.95;

/// Axis-aligned bounds of the reference path, padded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackBounds {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl TrackBounds {
    /// Bounds of all finite points, padded by `pad` on every side.
    ///
    /// `None` when there is no finite point.
    pub fn from_path(points: &[Point2<f64>], pad: f64) -> Option<Self> {
        let mut finite = points.iter().filter(|p| p.x.is_finite() && p.y.is_finite());
        let first = finite.next()?;
        let (min, max) = finite.fold((*first, *first), |(lo, hi), p| {
            (
                Point2::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point2::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        });
        let pad = Vector2::new(pad, pad);
        Some(Self {
            min: min - pad,
            max: max + pad,
        })
    }

    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn extent(&self) -> Vector2<f64> {
        self.max - self.min
    }

    /// Maps a track point into a `width` x `height` viewport.
    ///
    /// Uniform scale (95% fill), centered, screen Y pointing down.
    pub fn project(&self, point: &Point2<f64>, width: f64, height: f64) -> Point2<f64> {
        let extent = self.extent();
        let sx = width / nonzero(extent.x);
        let sy = height / nonzero(extent.y);
        let scale = sx.min(sy) * FILL;
        let c = self.center();
        Point2::new(
            width / 2.0 + (point.x - c.x) * scale,
            height / 2.0 - (point.y - c.y) * scale,
        )
    }
}

fn nonzero(v: f64) -> f64 {
    if v == 0.0 {
        1.0
    } else {
        v
    }
}
