//! Timestamped value sequences consumed and produced by the sampler.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplerError};
use crate::spectrum::infer_spacing;
use crate::traits::SeriesInterpolator;

/// One observation. Field order (`timestamp`, `value`) is what downstream
/// aggregation and serialization expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimestampedSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        TimestampedSample { timestamp, value }
    }
}

/// Series on a fixed grid. Every gap equals `spacing`, except the last one
/// which may be shorter.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSeries {
    name: String,
    spacing: Duration,
    samples: Vec<TimestampedSample>,
}

impl UniformSeries {
    pub fn new(name: impl Into<String>, spacing: Duration, samples: Vec<TimestampedSample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(SamplerError::MalformedInput("uniform series is empty".into()));
        }
        if spacing <= Duration::zero() {
            return Err(SamplerError::MalformedInput(format!("non-positive spacing {}", spacing)));
        }
        let gaps = samples.len().saturating_sub(1);
        for (i, pair) in samples.windows(2).enumerate() {
            let diff = pair[1].timestamp - pair[0].timestamp;
            let is_last = i + 1 == gaps;
            let ok = if is_last {
                diff > Duration::zero() && diff <= spacing
            } else {
                diff == spacing
            };
            if !ok {
                return Err(SamplerError::MalformedInput(format!(
                    "gap {} at index {} does not match spacing {}", diff, i + 1, spacing)));
            }
        }
        Ok(UniformSeries { name: name.into(), spacing, samples })
    }

    /// Builds a series starting at `start` with one value per grid step.
    pub fn from_values(name: impl Into<String>, start: DateTime<Utc>, spacing: Duration, values: &[f64]) -> Result<Self> {
        let samples = values.iter().enumerate()
            .map(|(i, &v)| TimestampedSample::new(start + spacing * i as i32, v))
            .collect();
        Self::new(name, spacing, samples)
    }

    /// Regularizes arbitrary ordered samples onto their inferred spacing.
    pub fn from_irregular<I: SeriesInterpolator>(name: impl Into<String>, samples: &[TimestampedSample],
                                                 interpolator: &I) -> Result<Self> {
        let name = name.into();
        let spacing = infer_spacing(samples)
            .ok_or_else(|| SamplerError::MalformedInput(format!("cannot infer spacing of {}", name)))?;
        let grid = interpolator.interpolate(samples, spacing.duration())?;
        Self::new(name, spacing.duration(), grid)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    pub fn samples(&self) -> &[TimestampedSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.samples[0].timestamp
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.samples[self.samples.len() - 1].timestamp
    }

    /// Last sample in `(after, until]`.
    pub fn last_in(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> Option<&TimestampedSample> {
        self.latest_at_or_before(until).filter(|s| s.timestamp > after)
    }

    /// Nearest sample at or before `until`.
    pub fn latest_at_or_before(&self, until: DateTime<Utc>) -> Option<&TimestampedSample> {
        let idx = self.samples.partition_point(|s| s.timestamp <= until);
        idx.checked_sub(1).map(|i| &self.samples[i])
    }
}

/// Output of one sampling run, tagged with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedSeries {
    pub strategy: String,
    pub samples: Vec<TimestampedSample>,
}

impl ObservedSeries {
    pub fn new(strategy: impl Into<String>) -> Self {
        ObservedSeries { strategy: strategy.into(), samples: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Gaps between consecutive observations, in seconds.
    pub fn intervals_secs(&self) -> Vec<f64> {
        self.samples.windows(2)
            .map(|p| (p[1].timestamp - p[0].timestamp).num_milliseconds() as f64 / 1000.0)
            .collect()
    }
}
