use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::series::TimestampedSample;
use crate::tracker::TrackerWindows;

#[cfg_attr(test, mockall::automock)]
pub trait SeriesInterpolator {
    /// Resample `samples` onto an even grid of `spacing`.
    /// Fails with `MalformedInput` when timestamps are too disordered to
    /// interpolate, instead of producing garbage.
    fn interpolate(&self, samples: &[TimestampedSample], spacing: Duration) -> Result<Vec<TimestampedSample>>;
}

/// Anything that feeds innovation statistics to an `IntervalPolicy`.
pub trait InnovationSource {
    fn windows(&self) -> &TrackerWindows;
}

/// A recursive filter fed one observation at a time.
pub trait MeasurementTracker: InnovationSource {
    type Reading: ?Sized;

    fn observe(&mut self, timestamp: DateTime<Utc>, reading: &Self::Reading) -> Result<()>;

    /// Current filtered value.
    fn estimate(&self) -> f64;
}
