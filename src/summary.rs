use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::series::{ObservedSeries, UniformSeries};

/// Per-run statistics written to the report and logged by the CLI
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Name of the input series
    pub source: String,

    /// Strategy tag of the observed series ("fixed", "baseline", ...)
    pub strategy: String,

    pub input_samples: usize,
    pub observed_samples: usize,

    /// Share of input samples that were not collected (0.0 = none saved)
    pub reduction: f64,

    // ========================================================================
    // Inter-sample intervals (seconds)
    // ========================================================================
    pub min_interval_s: f64,
    pub mean_interval_s: f64,
    pub max_interval_s: f64,

    /// Gap between the last two observations
    pub final_interval_s: f64,

    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn from_run(input: &UniformSeries, observed: &ObservedSeries) -> Self {
        let intervals = observed.intervals_secs();
        let (min, max, sum) = intervals.iter().fold((f64::INFINITY, f64::NEG_INFINITY, 0.0), |(lo, hi, sum), &g| {
            (lo.min(g), hi.max(g), sum + g)
        });
        let (min, max, mean) = if intervals.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (min, max, sum / intervals.len() as f64)
        };
        let reduction = if input.is_empty() {
            0.0
        } else {
            1.0 - observed.len() as f64 / input.len() as f64
        };

        RunSummary {
            source: input.name().to_string(),
            strategy: observed.strategy.clone(),
            input_samples: input.len(),
            observed_samples: observed.len(),
            reduction,
            min_interval_s: min,
            mean_interval_s: mean,
            max_interval_s: max,
            final_interval_s: intervals.last().copied().unwrap_or(0.0),
            first_timestamp: observed.samples.first().map(|s| s.timestamp),
            last_timestamp: observed.samples.last().map(|s| s.timestamp),
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<24} {:<10} {:>5}/{:<5} saved {:>5.1}%  interval min/mean/max/final {:.3}/{:.3}/{:.3}/{:.3}s",
               self.source, self.strategy, self.observed_samples, self.input_samples, self.reduction * 100.0,
               self.min_interval_s, self.mean_interval_s, self.max_interval_s, self.final_interval_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimestampedSample;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_summary_statistics() {
        let input = UniformSeries::from_values("line", start(), Duration::seconds(1), &[1.0; 20]).unwrap();
        let mut observed = ObservedSeries::new("chameleon");
        for s in [0, 3, 8, 14] {
            observed.samples.push(TimestampedSample::new(start() + Duration::seconds(s), 1.0));
        }

        let summary = RunSummary::from_run(&input, &observed);
        assert_eq!(summary.source, "line");
        assert_eq!(summary.strategy, "chameleon");
        assert_eq!(summary.observed_samples, 4);
        assert!((summary.reduction - 0.8).abs() < 1e-12);
        assert_eq!(summary.min_interval_s, 3.0);
        assert_eq!(summary.max_interval_s, 6.0);
        assert!((summary.mean_interval_s - 14.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.final_interval_s, 6.0);
        assert_eq!(summary.last_timestamp, Some(start() + Duration::seconds(14)));
    }

    #[test]
    fn test_single_observation_has_zero_intervals() {
        let input = UniformSeries::from_values("line", start(), Duration::seconds(1), &[1.0; 5]).unwrap();
        let mut observed = ObservedSeries::new("fixed");
        observed.samples.push(TimestampedSample::new(start(), 1.0));

        let summary = RunSummary::from_run(&input, &observed);
        assert_eq!(summary.min_interval_s, 0.0);
        assert_eq!(summary.final_interval_s, 0.0);
    }

    #[test]
    fn test_summary_serde_roundtrip() {
        let input = UniformSeries::from_values("line", start(), Duration::seconds(1), &[1.0; 5]).unwrap();
        let observed = ObservedSeries::new("fixed");
        let summary = RunSummary::from_run(&input, &observed);

        let json = serde_json::to_string(&summary).expect("serialize failed");
        let restored: RunSummary = serde_json::from_str(&json).expect("deserialize failed");
        assert_eq!(restored, summary);
    }
}
