//! Nyquist / Oversampling Analyzer
//!
//! Decides whether a short window of samples is oversampled relative to the
//! signal's energy spectrum, and proposes a Nyquist-safe interval.
//!
//! ## Algorithm
//! 1. Infer the sample spacing (regular grid first, else the first gap)
//! 2. Regularize irregular windows onto that grid (linear interpolation)
//! 3. FFT the mean-removed values; PSD = |X_k|², energy E = Σ|X_k|² / n
//! 4. Walk PSD bins from index 0 until 99% of E is covered
//! 5. If the walk stopped early on a non-DC bin, the new Nyquist rate is
//!    twice that bin's frequency; oversampled when it is below the current rate
//!
//! Every "cannot tell" outcome (too few samples, zero spacing, interpolation
//! failure, zero energy) maps to `AnalysisResult::insufficient()`.

use chrono::Duration;
use log::debug;
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::interpolate::LinearInterpolator;
use crate::series::TimestampedSample;
use crate::traits::SeriesInterpolator;

// Fraction of total energy the retained band must cover
const ENERGY_CUTOFF: f64 = 0.99;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpacingUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
    Minutes,
}

impl SpacingUnit {
    pub fn seconds(self) -> f64 {
        match self {
            SpacingUnit::Seconds => 1.0,
            SpacingUnit::Milliseconds => 1e-3,
            SpacingUnit::Microseconds => 1e-6,
            SpacingUnit::Nanoseconds => 1e-9,
            SpacingUnit::Minutes => 60.0,
        }
    }

    fn nanos(self) -> i64 {
        match self {
            SpacingUnit::Seconds => 1_000_000_000,
            SpacingUnit::Milliseconds => 1_000_000,
            SpacingUnit::Microseconds => 1_000,
            SpacingUnit::Nanoseconds => 1,
            SpacingUnit::Minutes => 60_000_000_000,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            SpacingUnit::Seconds => "s",
            SpacingUnit::Milliseconds => "ms",
            SpacingUnit::Microseconds => "us",
            SpacingUnit::Nanoseconds => "ns",
            SpacingUnit::Minutes => "min",
        }
    }
}

/// Dominant sample spacing: `count` units of `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spacing {
    pub unit: SpacingUnit,
    pub count: i64,
    /// True when every gap in the window equals this spacing.
    pub regular: bool,
}

impl Spacing {
    pub fn seconds_per_sample(&self) -> f64 {
        self.count as f64 * self.unit.seconds()
    }

    pub fn duration(&self) -> Duration {
        Duration::nanoseconds(self.count.saturating_mul(self.unit.nanos()))
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Spacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_oversampled: bool,
    pub energy: f64,
    pub oversampling_ratio: f64,
    pub proposed_interval_seconds: f64,
}

impl AnalysisResult {
    /// "No adjustment" verdict for windows that cannot be analysed.
    pub fn insufficient() -> Self {
        AnalysisResult {
            is_oversampled: false,
            energy: 0.0,
            oversampling_ratio: 0.0,
            proposed_interval_seconds: 0.0,
        }
    }
}

/// Result of the 99%-energy walk over the PSD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyCutoff {
    pub all_bins_used: bool,
    pub cutoff_bin: usize,
}

/// Accumulates PSD bins from index 0 until 99% of `total_energy` is reached.
pub fn energy_cutoff(psd: &[f64], total_energy: f64) -> EnergyCutoff {
    let target = total_energy * ENERGY_CUTOFF;
    let mut level = 0.0;
    let mut idx = 0;
    while level < target && idx < psd.len() {
        level += psd[idx];
        idx += 1;
    }
    EnergyCutoff {
        all_bins_used: idx == psd.len(),
        cutoff_bin: idx.saturating_sub(1),
    }
}

/// Signed frequency of FFT bin `k` for `n` points at `rate` samples/s.
pub fn bin_frequency(k: usize, n: usize, rate: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let signed = if k <= (n - 1) / 2 { k as f64 } else { k as f64 - n as f64 };
    signed * rate / n as f64
}

fn regular_gap(samples: &[TimestampedSample]) -> Option<Duration> {
    // A single gap says nothing about regularity
    if samples.len() < 3 {
        return None;
    }
    let first = samples[1].timestamp - samples[0].timestamp;
    samples.windows(2)
        .all(|p| p[1].timestamp - p[0].timestamp == first)
        .then_some(first)
}

/// Coarsest unit that expresses `gap` exactly.
fn exact_spacing(gap: Duration) -> Option<Spacing> {
    let ns = gap.num_nanoseconds()?;
    if ns <= 0 {
        return None;
    }
    [SpacingUnit::Minutes, SpacingUnit::Seconds, SpacingUnit::Milliseconds,
     SpacingUnit::Microseconds, SpacingUnit::Nanoseconds]
        .into_iter()
        .find(|u| ns % u.nanos() == 0)
        .map(|unit| Spacing { unit, count: ns / unit.nanos(), regular: true })
}

/// First gap, truncated to the first unit (seconds, ms, us, ns) with a
/// non-zero whole count.
fn truncated_spacing(gap: Duration) -> Option<Spacing> {
    let ns = gap.num_nanoseconds()?;
    if ns <= 0 {
        return None;
    }
    [SpacingUnit::Seconds, SpacingUnit::Milliseconds, SpacingUnit::Microseconds, SpacingUnit::Nanoseconds]
        .into_iter()
        .find(|u| ns / u.nanos() > 0)
        .map(|unit| Spacing { unit, count: ns / unit.nanos(), regular: false })
}

/// Estimates the dominant spacing of `samples`, or `None` with fewer than
/// two samples or a non-positive first gap.
pub fn infer_spacing(samples: &[TimestampedSample]) -> Option<Spacing> {
    if samples.len() < 2 {
        return None;
    }
    if let Some(spacing) = regular_gap(samples).and_then(exact_spacing) {
        return Some(spacing);
    }
    truncated_spacing(samples[1].timestamp - samples[0].timestamp)
}

pub struct SignalFrequencyAnalyzer<I = LinearInterpolator> {
    interpolator: I,
}

impl Default for SignalFrequencyAnalyzer<LinearInterpolator> {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalFrequencyAnalyzer<LinearInterpolator> {
    pub fn new() -> Self {
        SignalFrequencyAnalyzer { interpolator: LinearInterpolator }
    }
}

impl<I: SeriesInterpolator> SignalFrequencyAnalyzer<I> {
    pub fn with_interpolator(interpolator: I) -> Self {
        SignalFrequencyAnalyzer { interpolator }
    }

    pub fn analyze(&self, samples: &[TimestampedSample]) -> AnalysisResult {
        let spacing = match infer_spacing(samples) {
            Some(s) => s,
            None => return AnalysisResult::insufficient(),
        };
        let samples_per_second = sampling_rate(&spacing);

        let regularized;
        let grid: &[TimestampedSample] = if spacing.regular {
            samples
        } else {
            match self.interpolator.interpolate(samples, spacing.duration()) {
                Ok(points) => {
                    regularized = points;
                    &regularized
                }
                Err(e) => {
                    debug!("[Analyzer] Regularization onto {} failed: {}", spacing, e);
                    return AnalysisResult::insufficient();
                }
            }
        };
        if grid.len() < 2 {
            return AnalysisResult::insufficient();
        }

        let n = grid.len();
        let psd = power_spectrum(grid);
        let energy = psd.iter().sum::<f64>() / n as f64;
        let cutoff = energy_cutoff(&psd, energy);

        let mut new_rate = samples_per_second;
        if !cutoff.all_bins_used && energy > 0.0 && cutoff.cutoff_bin != 0 {
            new_rate = 2.0 * bin_frequency(cutoff.cutoff_bin, n, samples_per_second).abs();
        }
        if !(new_rate.is_finite() && new_rate > 0.0) {
            return AnalysisResult { energy, ..AnalysisResult::insufficient() };
        }

        let result = AnalysisResult {
            is_oversampled: new_rate < samples_per_second,
            energy,
            oversampling_ratio: samples_per_second / new_rate,
            proposed_interval_seconds: 1.0 / new_rate,
        };
        debug!("[Analyzer] spacing={} rate={:.4}/s nyquist={:.4}/s energy={:.4} ratio={:.3} oversampled={}",
               spacing, samples_per_second, new_rate, energy, result.oversampling_ratio, result.is_oversampled);
        result
    }
}

/// |X_k|² of the mean-removed values. A flat window yields exact zeros.
fn power_spectrum(grid: &[TimestampedSample]) -> Vec<f64> {
    let n = grid.len();
    let (lo, hi) = grid.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.value), hi.max(s.value))
    });
    if lo == hi {
        return vec![0.0; n];
    }
    let mean = grid.iter().map(|s| s.value).sum::<f64>() / n as f64;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex<f64>> = grid.iter().map(|s| Complex::new(s.value - mean, 0.0)).collect();
    fft.process(&mut buffer);
    buffer.iter().map(|c| c.norm_sqr()).collect()
}

/// Samples per second implied by a spacing.
pub fn sampling_rate(spacing: &Spacing) -> f64 {
    NANOS_PER_SEC / spacing.duration().num_nanoseconds().unwrap_or(i64::MAX) as f64
}
