//! Innovation Tracker - 3-state linear Kalman filter
//!
//! Tracks how predictable the stream is. Each observation runs one
//! predict/update cycle on a fixed constant-acceleration-style model and
//! records the innovation normalized by the measurement:
//!
//!   e = sqrt(tr((y · z⁻¹)²))       (scalar case: |y / z|)
//!
//! The most recent `window_size` errors drive the interval policy:
//! - `current_error`        newest error
//! - `error_delta`          newest minus previous (sudden degradation)
//! - `weighted_total_error` harmonic-weighted mean, newest weighs most
//!
//! A second window keeps the raw samples for Nyquist analysis.

use chrono::{DateTime, Utc};
use log::debug;
use nalgebra::{Matrix1, Matrix3, RowVector3, Vector3};

use crate::config::FilterConfig;
use crate::error::{Result, SamplerError};
use crate::series::TimestampedSample;
use crate::spectrum::SignalFrequencyAnalyzer;
use crate::traits::{InnovationSource, MeasurementTracker};
use crate::window::RingWindow;

/// Divisor used in place of a zero measurement.
pub const ZERO_MEASUREMENT_GUARD: f64 = 1.0;

/// Outcome of `nyquist_check`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NyquistVerdict {
    pub oversampled: bool,
    pub upper_bound_ms: f64,
}

// ============================================================================
// WINDOWS
// ============================================================================

/// Error and sample windows shared by every tracker flavour.
#[derive(Debug, Clone)]
pub struct TrackerWindows {
    errors: RingWindow<f64>,
    samples: RingWindow<TimestampedSample>,
    harmonic_divider: f64,
}

impl TrackerWindows {
    pub fn new(window_size: usize, nyquist_window: usize) -> Self {
        let harmonic_divider = if window_size == 0 {
            1.0
        } else {
            (1..=window_size).map(|k| 1.0 / k as f64).sum()
        };
        TrackerWindows {
            errors: RingWindow::filled(window_size, 0.0),
            samples: RingWindow::new(nyquist_window),
            harmonic_divider,
        }
    }

    pub fn push_error(&mut self, error: f64) {
        self.errors.push(error);
    }

    pub fn push_sample(&mut self, sample: TimestampedSample) {
        self.samples.push(sample);
    }

    pub fn current_error(&self) -> f64 {
        self.errors.get(0).copied().unwrap_or(0.0)
    }

    pub fn error_delta(&self) -> f64 {
        let previous = self.errors.get(1).copied().unwrap_or(0.0);
        self.current_error() - previous
    }

    pub fn weighted_total_error(&self) -> f64 {
        let total: f64 = self.errors.iter()
            .enumerate()
            .map(|(i, e)| e / (i + 1) as f64)
            .sum();
        total / self.harmonic_divider
    }

    pub fn errors(&self) -> &RingWindow<f64> {
        &self.errors
    }

    pub fn samples(&self) -> &RingWindow<TimestampedSample> {
        &self.samples
    }

    /// Spectral upper bound for the next interval.
    ///
    /// Only runs the analyzer once the sample window is full. Without an
    /// oversampling verdict the caller's `fallback_upper_ms` is returned.
    /// With `oversampling_cap`, a ratio above the cap gives
    /// `(ratio / cap) × proposed` seconds, returned in milliseconds.
    pub fn nyquist_check(&self, fallback_upper_ms: f64, oversampling_cap: Option<f64>) -> NyquistVerdict {
        let fallback = NyquistVerdict { oversampled: false, upper_bound_ms: fallback_upper_ms };
        if !self.samples.is_full() {
            return fallback;
        }

        let result = SignalFrequencyAnalyzer::new().analyze(&self.samples.to_chronological());
        if !result.is_oversampled {
            return fallback;
        }

        let upper_bound_ms = match oversampling_cap {
            Some(cap) if result.oversampling_ratio > cap => {
                result.oversampling_ratio / cap * result.proposed_interval_seconds * 1000.0
            }
            _ => result.proposed_interval_seconds * 1000.0,
        };
        debug!("[Tracker] Nyquist bound {:.1}ms (ratio {:.3}, cap {:?})",
               upper_bound_ms, result.oversampling_ratio, oversampling_cap);
        NyquistVerdict { oversampled: true, upper_bound_ms }
    }
}

// ============================================================================
// FILTER
// ============================================================================

/// Model and mutable estimate of the 3-state filter.
#[derive(Debug, Clone)]
pub struct FilterState {
    pub x: Vector3<f64>,
    pub f: Matrix3<f64>,
    pub h: RowVector3<f64>,
    pub q: Matrix3<f64>,
    pub r: f64,
    pub p: Matrix3<f64>,
}

impl FilterState {
    pub fn from_config(config: &FilterConfig) -> Self {
        let dt = config.dt;
        FilterState {
            x: Vector3::from(config.initial_state),
            f: Matrix3::new(
                1.0, dt, 0.0,
                0.0, 1.0, dt,
                0.0, 0.0, 1.0,
            ),
            h: RowVector3::new(1.0, 0.0, 0.0),
            q: matrix_from_rows(&config.process_noise),
            r: config.measurement_noise,
            p: matrix_from_rows(&config.initial_covariance),
        }
    }
}

fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

/// Single-sensor innovation tracker.
#[derive(Debug, Clone)]
pub struct InnovationTracker {
    state: FilterState,
    windows: TrackerWindows,
    steps: u64,
}

impl InnovationTracker {
    pub fn new(filter: &FilterConfig, window_size: usize, nyquist_window: usize) -> Self {
        InnovationTracker {
            state: FilterState::from_config(filter),
            windows: TrackerWindows::new(window_size, nyquist_window),
            steps: 0,
        }
    }

    pub fn initialize(&mut self, initial_state: [f64; 3]) {
        self.state.x = Vector3::from(initial_state);
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// One predict/update cycle. A singular innovation covariance or a
    /// non-finite state is returned as `NumericDegeneracy`; the estimate and
    /// the error window keep their pre-call values.
    pub fn predict_and_update(&mut self, timestamp: DateTime<Utc>, measurement: f64) -> Result<()> {
        self.windows.push_sample(TimestampedSample::new(timestamp, measurement));

        let divisor = if measurement == 0.0 { ZERO_MEASUREMENT_GUARD } else { measurement };
        let s = &self.state;

        // Predict
        let x_pred = s.f * s.x;
        let p_pred = s.f * s.p * s.f.transpose() + s.q;

        // Update
        let z = Matrix1::new(measurement);
        let y = z - s.h * x_pred;
        let s_cov = s.h * p_pred * s.h.transpose() + Matrix1::new(s.r);
        let s_inv = s_cov.try_inverse()
            .filter(|inv| inv[(0, 0)].is_finite())
            .ok_or_else(|| SamplerError::degenerate(
                "innovation covariance", format!("S = {} is singular", s_cov[(0, 0)])))?;
        let k = p_pred * s.h.transpose() * s_inv;
        let x_new = x_pred + k * y;

        // Joseph form keeps P symmetric positive semi-definite
        let i_kh = Matrix3::identity() - k * s.h;
        let p_new = i_kh * p_pred * i_kh.transpose() + k * Matrix1::new(s.r) * k.transpose();

        if !x_new.iter().all(|v| v.is_finite()) {
            return Err(SamplerError::degenerate("state update", format!("x = {:?}", x_new.as_slice())));
        }
        if !p_new.iter().all(|v| v.is_finite()) {
            return Err(SamplerError::degenerate("covariance update", "P contains NaN/Inf"));
        }

        self.state.x = x_new;
        self.state.p = p_new;
        self.steps += 1;

        let normalized = y * Matrix1::new(divisor).try_inverse().unwrap_or_else(Matrix1::zeros);
        let squared = normalized * normalized;
        let error = squared.trace().sqrt();
        self.windows.push_error(error);

        debug!("[Tracker] z={:.4} x0={:.4} y={:.4} err={:.4} delta={:.4}",
               measurement, x_new[0], y[(0, 0)], error, self.windows.error_delta());
        Ok(())
    }

    pub fn current_error(&self) -> f64 {
        self.windows.current_error()
    }

    pub fn error_delta(&self) -> f64 {
        self.windows.error_delta()
    }

    pub fn weighted_total_error(&self) -> f64 {
        self.windows.weighted_total_error()
    }

    pub fn nyquist_check(&self, fallback_upper_ms: f64, oversampling_cap: Option<f64>) -> NyquistVerdict {
        self.windows.nyquist_check(fallback_upper_ms, oversampling_cap)
    }
}

impl InnovationSource for InnovationTracker {
    fn windows(&self) -> &TrackerWindows {
        &self.windows
    }
}

impl MeasurementTracker for InnovationTracker {
    type Reading = f64;

    fn observe(&mut self, timestamp: DateTime<Utc>, reading: &f64) -> Result<()> {
        self.predict_and_update(timestamp, *reading)
    }

    fn estimate(&self) -> f64 {
        self.state.x[0]
    }
}
