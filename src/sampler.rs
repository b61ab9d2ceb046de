//! Sampling Loop - replays a uniform series at adaptive intervals
//!
//! Walks the input forward in time: read the latest value since the
//! previous observation, record it, feed it to the controller and advance
//! by the interval the controller returns. Fractional intervals are split
//! into whole seconds plus truncated milliseconds before being added to the
//! timestamp, so the walk lands on the same instants on every replay.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::config::SystemConfig;
use crate::controller::AdaptiveController;
use crate::error::{Result, SamplerError};
use crate::fusion::FUSED_NAME;
use crate::policy::StrategyKind;
use crate::series::{ObservedSeries, TimestampedSample, UniformSeries};

// Smallest step the loop will take
const MIN_STEP_MS: i64 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingLoop {
    artificial_cutoff: bool,
}

impl SamplingLoop {
    pub fn new(artificial_cutoff: bool) -> Self {
        SamplingLoop { artificial_cutoff }
    }

    /// Samples `series` starting at its first timestamp.
    ///
    /// Without a controller the loop keeps `initial_interval_secs` for every
    /// step (the fixed-rate comparator). With one, the first step already
    /// uses the interval returned for the first observation.
    pub fn run(&self, series: &UniformSeries, initial_interval_secs: f64,
               mut controller: Option<&mut AdaptiveController>) -> Result<ObservedSeries> {
        let name = controller.as_ref().map_or(StrategyKind::Fixed.name(), |c| c.name());
        let mut observed = ObservedSeries::new(name);
        let last = series.last_timestamp();
        let mut step = split_interval(initial_interval_secs);
        let mut previous = series.first_timestamp();
        let mut current = previous;

        while current < last {
            let value = read_value(series, previous, current)
                .ok_or_else(|| SamplerError::MalformedInput(format!(
                    "no value in {} at or before {}", series.name(), current)))?;
            observed.samples.push(TimestampedSample::new(current, value));

            if let Some(c) = controller.as_deref_mut() {
                let secs = c.observe(current, &value)?;
                step = split_interval(secs);
            }
            previous = current;
            current += step;

            if self.artificial_cutoff && observed.len() >= series.len() {
                debug!("[Sampler] {} cut off after {} observations", name, observed.len());
                break;
            }
        }

        info!("[Sampler] {} on {}: {} observations from {} samples",
              name, series.name(), observed.len(), series.len());
        Ok(observed)
    }

    /// Samples several sensors jointly through one fused controller.
    ///
    /// The walk spans the earliest first timestamp to the latest last
    /// timestamp. The first observation is the least-squares estimate of the
    /// readings up to one initial interval in; each later one is the filtered
    /// estimate after the update. A sensor with no value yet reads as 0.
    pub fn run_fused(&self, series: &[UniformSeries], config: &SystemConfig) -> Result<ObservedSeries> {
        config.validate()?;
        let (first, last, max_len) = series.iter().fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>, usize)>, s| {
            Some(match acc {
                None => (s.first_timestamp(), s.last_timestamp(), s.len()),
                Some((f, l, n)) => (f.min(s.first_timestamp()), l.max(s.last_timestamp()), n.max(s.len())),
            })
        }).ok_or_else(|| SamplerError::MalformedInput("fused sampling needs at least one series".into()))?;

        let mut step = split_interval(config.controller.initial_interval_ms as f64 / 1000.0);
        let initial = read_sensors(series, first, first + step);
        let mut controller = AdaptiveController::fused(config, &initial)?;

        let mut observed = ObservedSeries::new(FUSED_NAME);
        observed.samples.push(TimestampedSample::new(first, controller.estimate()));
        let mut previous = first;
        let mut current = first + step;

        while current < last {
            let readings = read_sensors(series, previous, current);
            let secs = controller.observe(current, readings.as_slice())?;
            observed.samples.push(TimestampedSample::new(current, controller.estimate()));
            step = split_interval(secs);
            previous = current;
            current += step;

            if self.artificial_cutoff && observed.len() >= max_len {
                debug!("[Sampler] {} cut off after {} observations", FUSED_NAME, observed.len());
                break;
            }
        }

        info!("[Sampler] {} over {} sensors: {} observations", FUSED_NAME, series.len(), observed.len());
        Ok(observed)
    }
}

/// Latest value in `(after, until]`, else the latest at or before `until`.
fn read_value(series: &UniformSeries, after: DateTime<Utc>, until: DateTime<Utc>) -> Option<f64> {
    series.last_in(after, until)
        .or_else(|| series.latest_at_or_before(until))
        .map(|s| s.value)
}

fn read_sensors(series: &[UniformSeries], after: DateTime<Utc>, until: DateTime<Utc>) -> Vec<f64> {
    series.iter()
        .map(|s| read_value(s, after, until).unwrap_or(0.0))
        .collect()
}

/// Whole seconds plus truncated milliseconds, never below one millisecond.
pub fn split_interval(secs: f64) -> Duration {
    let whole = secs.trunc();
    let millis = ((secs - whole) * 1000.0) as i64;
    let step = Duration::seconds(whole as i64) + Duration::milliseconds(millis);
    if step < Duration::milliseconds(MIN_STEP_MS) {
        warn!("[Sampler] Interval {}s is not a usable step, using {}ms", secs, MIN_STEP_MS);
        return Duration::milliseconds(MIN_STEP_MS);
    }
    step
}

/// Replays `series` with one strategy built from `config`. An invalid
/// configuration is rejected before any sample is read.
///
/// The baseline never settles on a comparable sample count, so it always
/// runs with the artificial cutoff.
pub fn run_strategy(series: &UniformSeries, config: &SystemConfig, kind: StrategyKind) -> Result<ObservedSeries> {
    config.validate()?;
    let initial_secs = config.controller.initial_interval_ms as f64 / 1000.0;
    let cutoff = config.sampling.artificial_cutoff || kind == StrategyKind::Baseline;
    let sampler = SamplingLoop::new(cutoff);
    match AdaptiveController::for_strategy(config, kind) {
        Some(mut controller) => sampler.run(series, initial_secs, Some(&mut controller)),
        None => sampler.run(series, initial_secs, None),
    }
}

/// Adaptive replay of one stream with the configured Chameleon controller.
pub fn analyze_stream(series: &UniformSeries, config: &SystemConfig) -> Result<ObservedSeries> {
    run_strategy(series, config, StrategyKind::Chameleon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap()
    }

    fn ramp(len: usize, spacing_ms: i64) -> UniformSeries {
        let values: Vec<f64> = (0..len).map(|i| i as f64).collect();
        UniformSeries::from_values("ramp", start(), Duration::milliseconds(spacing_ms), &values).unwrap()
    }

    #[test]
    fn test_split_interval() {
        assert_eq!(split_interval(4.0), Duration::seconds(4));
        assert_eq!(split_interval(2.25), Duration::milliseconds(2_250));
        // Truncation, not rounding, of the sub-second part
        assert_eq!(split_interval(1.9999), Duration::milliseconds(1_999));
        assert_eq!(split_interval(0.0), Duration::milliseconds(1));
        assert_eq!(split_interval(-2.0), Duration::milliseconds(1));
        assert_eq!(split_interval(f64::NAN), Duration::milliseconds(1));
    }

    #[test]
    fn test_fixed_rate_spacing() {
        let series = ramp(101, 1_000);
        let observed = SamplingLoop::default().run(&series, 4.0, None).unwrap();
        assert_eq!(observed.strategy, "fixed");
        assert_eq!(observed.len(), 25, "0..100s every 4s, last timestamp excluded");
        assert!(observed.intervals_secs().iter().all(|&g| g == 4.0));
        // Values are the series values at the observation instants
        assert_eq!(observed.samples[3].value, 12.0);
    }

    #[test]
    fn test_fractional_interval_reads_latest_value() {
        let series = ramp(11, 1_000);
        let observed = SamplingLoop::default().run(&series, 1.5, None).unwrap();
        let values: Vec<f64> = observed.samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![0.0, 1.0, 3.0, 4.0, 6.0, 7.0, 9.0]);
    }

    #[test]
    fn test_cutoff_limits_observations() {
        let series = ramp(20, 1_000);
        let observed = SamplingLoop::new(true).run(&series, 0.1, None).unwrap();
        assert_eq!(observed.len(), series.len());
    }

    #[test]
    fn test_adaptive_run_is_deterministic() {
        let values: Vec<f64> = (0..600).map(|i| 20.0 + (i as f64 * 0.05).sin()).collect();
        let series = UniformSeries::from_values("wave", start(), Duration::seconds(1), &values).unwrap();
        let config = SystemConfig::default();

        let a = analyze_stream(&series, &config).unwrap();
        let b = analyze_stream(&series, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.strategy, "chameleon");
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_baseline_is_cut_off() {
        let series = ramp(30, 100);
        let observed = run_strategy(&series, &SystemConfig::default(), StrategyKind::Baseline).unwrap();
        assert_eq!(observed.strategy, "baseline");
        assert!(observed.len() <= series.len());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let series = ramp(30, 1_000);
        let mut config = SystemConfig::default();
        config.controller.nyquist_window = 0;

        for kind in [StrategyKind::Fixed, StrategyKind::Baseline, StrategyKind::Chameleon] {
            let err = run_strategy(&series, &config, kind).unwrap_err();
            assert!(matches!(err, SamplerError::InvalidConfig(_)), "{} accepted a zero window", kind.name());
        }
        assert!(matches!(analyze_stream(&series, &config), Err(SamplerError::InvalidConfig(_))));

        let err = SamplingLoop::default().run_fused(&[series], &config).unwrap_err();
        assert!(matches!(err, SamplerError::InvalidConfig(_)));
    }

    #[test]
    fn test_fused_requires_series() {
        let err = SamplingLoop::default().run_fused(&[], &SystemConfig::default()).unwrap_err();
        assert!(matches!(err, SamplerError::MalformedInput(_)));
    }

    #[test]
    fn test_fused_run_starts_with_mean() {
        let a = UniformSeries::from_values("a", start(), Duration::seconds(1), &[10.0; 60]).unwrap();
        let b = UniformSeries::from_values("b", start(), Duration::seconds(1), &[12.0; 60]).unwrap();
        let observed = SamplingLoop::default().run_fused(&[a, b], &SystemConfig::default()).unwrap();
        assert_eq!(observed.strategy, "fused");
        assert_eq!(observed.samples[0].timestamp, start());
        assert!((observed.samples[0].value - 11.0).abs() < 1e-9);
        assert!(observed.samples.iter().all(|s| (s.value - 11.0).abs() < 1e-6));
    }
}
