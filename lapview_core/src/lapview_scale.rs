//! The "SCALE" Engine - Percentile Normalizer
//!
//! Color ramps and gauges need an upper bound that a single spike cannot
//! blow up. The bound used everywhere is a percentile of the magnitudes:
//! - heatmap: 90th percentile of |average longitudinal acceleration|
//! - speed gauge: 95th percentile of speed over the whole session
//!
//! The result is a pure function of the input multiset (finite values sorted
//! by magnitude with a stable sort, fixed index formula), so recomputing it
//! after a unit switch always lands on the same number.

use crate::readout::SpeedUnit;
use crate::store::SeriesStore;

/// How to turn a distribution into a scale bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleSpec {
    /// Percentile rank in [0, 1]
    pub percentile: f64,
    /// Returned when no finite value is available
    pub fallback: f64,
    /// Minimum magnitude of the result
    pub floor: f64,
}

impl ScaleSpec {
    /// Heatmap color scale: p90 of |avg acceleration| (m/s²).
    pub const HEATMAP: ScaleSpec = ScaleSpec {
        percentile: 0.9,
        fallback: 1.0,
        floor: 0.1,
    };

    /// Scale at `percentile` with a tiny floor and a fallback of 1.
    pub fn at_percentile(percentile: f64) -> Self {
        Self {
            percentile,
            fallback: 1.0,
            floor: f64::EPSILON,
        }
    }

    /// Speed gauge upper bound: p95 of speed, at least 60 mph / 100 km/h.
    pub fn speed_gauge(unit: SpeedUnit) -> Self {
        Self {
            percentile: 0.95,
            fallback: unit.gauge_floor(),
            floor: unit.gauge_floor(),
        }
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Magnitude at `percentile` of the finite values, `None` if there are none.
///
/// Values are sorted ascending by absolute value and the element at
/// `floor(n * percentile)` (clamped to the last index) is returned as a
/// magnitude.
pub fn percentile_magnitude<I>(values: I, percentile: f64) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut magnitudes: Vec<f64> = values
        .into_iter()
        .filter(|v| v.is_finite())
        .map(f64::abs)
        .collect();
    if magnitudes.is_empty() {
        return None;
    }

    // Stable sort; total_cmp keeps the order fully defined.
    magnitudes.sort_by(|a, b| a.total_cmp(b));

    let p = if percentile.is_finite() {
        percentile.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let n = magnitudes.len();
    let index = ((n as f64 * p).floor() as usize).min(n - 1);
    Some(magnitudes[index])
}

/// Robust scale bound of `values` according to `spec`.
///
/// Never returns less than `spec.floor`; all-`NaN` or empty input yields the
/// fallback (also floored).
pub fn robust_scale<I>(values: I, spec: &ScaleSpec) -> f64
where
    I: IntoIterator<Item = f64>,
{
    percentile_magnitude(values, spec.percentile)
        .unwrap_or(spec.fallback)
        .max(spec.floor)
}

/// Upper bound for the live speed gauge in `unit`, across every car and sample.
pub fn speed_gauge_max(store: &SeriesStore, unit: SpeedUnit) -> f64 {
    let channel = unit.channel();
    let speeds = store
        .entities()
        .iter()
        .flat_map(|e| e.samples.iter())
        .map(|s| s.value(channel));
    robust_scale(speeds, &ScaleSpec::speed_gauge(unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_percentile_of_one_to_hundred() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let spec = ScaleSpec::at_percentile(0.9);

        assert_eq!(robust_scale(values.clone(), &spec), 91.0);
        assert_eq!(percentile_magnitude(values, 0.9), Some(91.0));
    }

    #[test]
    fn test_order_does_not_matter() {
        let mut values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        values.reverse();
        values.swap(3, 77);
        values.swap(10, 50);

        assert_eq!(robust_scale(values, &ScaleSpec::at_percentile(0.9)), 91.0);
    }

    #[test]
    fn test_sorted_by_magnitude() {
        let values = vec![-10.0, 1.0, -2.0, 3.0];
        // |.| sorted: 1, 2, 3, 10 -> index floor(4 * 0.5) = 2
        assert_eq!(percentile_magnitude(values, 0.5), Some(3.0));
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let values = vec![f64::NAN, 5.0, f64::INFINITY, f64::NEG_INFINITY, 2.0];
        assert_eq!(percentile_magnitude(values, 1.0), Some(5.0));
    }

    #[test]
    fn test_empty_input_uses_fallback() {
        let spec = ScaleSpec::at_percentile(0.9).with_fallback(7.5);
        assert_eq!(robust_scale(Vec::<f64>::new(), &spec), 7.5);
        assert_eq!(robust_scale(vec![f64::NAN, f64::NAN], &spec), 7.5);
    }

    #[test]
    fn test_degenerate_scale_is_floored() {
        let spec = ScaleSpec::at_percentile(0.9).with_floor(0.5);
        assert_eq!(robust_scale(vec![0.0; 20], &spec), 0.5);
        assert_eq!(robust_scale(vec![0.2; 5], &ScaleSpec::HEATMAP), 0.2);
        assert_eq!(robust_scale(vec![0.01; 5], &ScaleSpec::HEATMAP), 0.1);
    }

    #[test]
    fn test_percentile_one_clamps_to_last() {
        let values = vec![1.0, 2.0, 3.0];
        assert_eq!(percentile_magnitude(values.clone(), 1.0), Some(3.0));
        assert_eq!(percentile_magnitude(values, 0.0), Some(1.0));
    }

    #[test]
    fn test_speed_gauge_spec_floors() {
        assert_eq!(ScaleSpec::speed_gauge(SpeedUnit::Mph).floor, 60.0);
        assert_eq!(ScaleSpec::speed_gauge(SpeedUnit::Kmh).floor, 100.0);
        assert_eq!(ScaleSpec::speed_gauge(SpeedUnit::Kmh).percentile, 0.95);
    }

    proptest! {
        #[test]
        fn prop_scale_is_permutation_invariant(
            mut values in prop::collection::vec(-1000.0f64..1000.0, 0..200),
            seed in any::<u64>(),
        ) {
            let spec = ScaleSpec::HEATMAP;
            let expected = robust_scale(values.clone(), &spec);

            // Deterministic shuffle driven by the seed.
            let n = values.len();
            let mut state = seed | 1;
            for i in (1..n).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let j = (state % (i as u64 + 1)) as usize;
                values.swap(i, j);
            }

            prop_assert_eq!(robust_scale(values, &spec), expected);
            prop_assert!(expected >= spec.floor);
        }
    }
}
