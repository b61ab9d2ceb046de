//! Linear regularization of irregular samples onto an even grid.

use chrono::Duration;

use crate::error::{Result, SamplerError};
use crate::series::TimestampedSample;
use crate::traits::SeriesInterpolator;

// Refuse to build absurd grids from a tiny spacing over a long span
const MAX_GRID_POINTS: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl SeriesInterpolator for LinearInterpolator {
    fn interpolate(&self, samples: &[TimestampedSample], spacing: Duration) -> Result<Vec<TimestampedSample>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        if spacing <= Duration::zero() {
            return Err(SamplerError::MalformedInput(format!("non-positive grid spacing {}", spacing)));
        }
        if let Some(i) = samples.windows(2).position(|p| p[1].timestamp <= p[0].timestamp) {
            return Err(SamplerError::MalformedInput(format!(
                "timestamps not strictly increasing at index {}", i + 1)));
        }

        let start = samples[0].timestamp;
        let span = samples[samples.len() - 1].timestamp - start;
        let step_ns = spacing.num_nanoseconds()
            .ok_or_else(|| SamplerError::MalformedInput("grid spacing overflows".into()))?;
        let span_ns = span.num_nanoseconds()
            .ok_or_else(|| SamplerError::MalformedInput("series span overflows".into()))?;
        let points = span_ns / step_ns + 1;
        if points > MAX_GRID_POINTS {
            return Err(SamplerError::MalformedInput(format!(
                "grid of {} points exceeds limit {}", points, MAX_GRID_POINTS)));
        }

        let mut out = Vec::with_capacity(points as usize);
        let mut seg = 0usize;
        for k in 0..points {
            let ts = start + Duration::nanoseconds(k * step_ns);
            while seg + 1 < samples.len() - 1 && samples[seg + 1].timestamp <= ts {
                seg += 1;
            }
            let value = if samples.len() == 1 {
                samples[0].value
            } else {
                let (a, b) = (&samples[seg], &samples[seg + 1]);
                let width = (b.timestamp - a.timestamp).num_nanoseconds().unwrap_or(i64::MAX) as f64;
                let offset = (ts - a.timestamp).num_nanoseconds().unwrap_or(0) as f64;
                let frac = (offset / width).clamp(0.0, 1.0);
                a.value + (b.value - a.value) * frac
            };
            out.push(TimestampedSample::new(ts, value));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_linear_between_points() {
        let samples = vec![
            TimestampedSample::new(at(0), 0.0),
            TimestampedSample::new(at(3_000), 3.0),
            TimestampedSample::new(at(4_000), 5.0),
        ];
        let grid = LinearInterpolator.interpolate(&samples, Duration::seconds(1)).unwrap();
        let values: Vec<f64> = grid.iter().map(|s| s.value).collect();
        assert_eq!(grid.len(), 5);
        assert_abs_diff_eq!(values[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[2], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[3], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[4], 5.0, epsilon = 1e-12);
        assert_eq!(grid[4].timestamp, at(4_000));
    }

    #[test]
    fn test_grid_stops_before_overshooting_last_sample() {
        let samples = vec![
            TimestampedSample::new(at(0), 0.0),
            TimestampedSample::new(at(2_500), 5.0),
        ];
        let grid = LinearInterpolator.interpolate(&samples, Duration::seconds(1)).unwrap();
        assert_eq!(grid.len(), 3);
        assert_abs_diff_eq!(grid[2].value, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_order_fails() {
        let samples = vec![
            TimestampedSample::new(at(2_000), 0.0),
            TimestampedSample::new(at(1_000), 1.0),
            TimestampedSample::new(at(3_000), 2.0),
        ];
        let err = LinearInterpolator.interpolate(&samples, Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, SamplerError::MalformedInput(_)));
    }

    #[test]
    fn test_oversized_grid_fails() {
        let samples = vec![
            TimestampedSample::new(at(0), 0.0),
            TimestampedSample::new(at(3_600_000), 1.0),
        ];
        assert!(LinearInterpolator.interpolate(&samples, Duration::microseconds(1)).is_err());
    }
}
