//! Multi-sensor fused tracker.
//!
//! One latent value observed by `m` sensors: `H = 1ₘ`, `R = r·Iₘ`, `F = 1`.
//! Readings are fused by least squares (the mean, for an all-ones `H`)
//! before filtering, and the innovation vector is normalized element-wise
//! like the single-sensor tracker, so the same interval policy applies.

use chrono::{DateTime, Utc};
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::config::FusionConfig;
use crate::error::{Result, SamplerError};
use crate::series::TimestampedSample;
use crate::tracker::{NyquistVerdict, TrackerWindows, ZERO_MEASUREMENT_GUARD};
use crate::traits::{InnovationSource, MeasurementTracker};

/// Tag of series produced by the fused loop.
pub const FUSED_NAME: &str = "fused";

#[derive(Debug, Clone)]
pub struct FusedTracker {
    sensors: usize,
    x: f64,
    p: f64,
    q: f64,
    h: DMatrix<f64>,
    r: DMatrix<f64>,
    windows: TrackerWindows,
}

impl FusedTracker {
    /// Creates the tracker and seeds the estimate from the first readings.
    pub fn new(config: &FusionConfig, initial_readings: &[f64], window_size: usize, nyquist_window: usize) -> Result<Self> {
        let sensors = initial_readings.len();
        if sensors == 0 {
            return Err(SamplerError::MalformedInput("fused tracker needs at least one sensor".into()));
        }
        let mut tracker = FusedTracker {
            sensors,
            x: 0.0,
            p: 1.0,
            q: config.process_noise,
            h: DMatrix::from_element(sensors, 1, 1.0),
            r: DMatrix::identity(sensors, sensors) * config.measurement_noise,
            windows: TrackerWindows::new(window_size, nyquist_window),
        };
        tracker.initialize(initial_readings)?;
        Ok(tracker)
    }

    /// Least-squares solve of `H·x = z`.
    pub fn initialize(&mut self, readings: &[f64]) -> Result<()> {
        self.x = self.fuse(readings)?;
        Ok(())
    }

    pub fn estimate(&self) -> f64 {
        self.x
    }

    pub fn sensors(&self) -> usize {
        self.sensors
    }

    fn fuse(&self, readings: &[f64]) -> Result<f64> {
        if readings.len() != self.sensors {
            return Err(SamplerError::MalformedInput(format!(
                "expected {} sensor readings, got {}", self.sensors, readings.len())));
        }
        let z = DVector::from_column_slice(readings);
        let svd = self.h.clone().svd(true, true);
        let solution = svd.solve(&z, 1e-12)
            .map_err(|e| SamplerError::degenerate("sensor fusion", e))?;
        Ok(solution[0])
    }

    pub fn predict_and_update(&mut self, timestamp: DateTime<Utc>, readings: &[f64]) -> Result<()> {
        let fused = self.fuse(readings)?;
        self.windows.push_sample(TimestampedSample::new(timestamp, fused));

        // Predict (F = 1)
        let x_pred = self.x;
        let p_pred = self.p + self.q;

        // Update
        let z = DMatrix::from_column_slice(self.sensors, 1, readings);
        let y = z - &self.h * x_pred;
        let s = &self.h * p_pred * self.h.transpose() + &self.r;
        let s_inv = s.clone().try_inverse()
            .ok_or_else(|| SamplerError::degenerate("fused innovation covariance", "S is singular"))?;
        let k = p_pred * self.h.transpose() * s_inv;
        let x_new = x_pred + (&k * &y)[0];
        let kh = (&k * &self.h)[0];
        let krk = (&k * &self.r * k.transpose())[0];
        let p_new = (1.0 - kh) * p_pred * (1.0 - kh) + krk;

        if !x_new.is_finite() || !p_new.is_finite() {
            return Err(SamplerError::degenerate("fused update", format!("x={} P={}", x_new, p_new)));
        }
        self.x = x_new;
        self.p = p_new;

        let error = y.iter().zip(readings)
            .map(|(yi, &zi)| {
                let divisor = if zi == 0.0 { ZERO_MEASUREMENT_GUARD } else { zi };
                (yi / divisor).powi(2)
            })
            .sum::<f64>()
            .sqrt();
        self.windows.push_error(error);

        debug!("[Fusion] fused={:.4} x={:.4} err={:.4}", fused, x_new, error);
        Ok(())
    }

    pub fn nyquist_check(&self, fallback_upper_ms: f64, oversampling_cap: Option<f64>) -> NyquistVerdict {
        self.windows.nyquist_check(fallback_upper_ms, oversampling_cap)
    }
}

impl InnovationSource for FusedTracker {
    fn windows(&self) -> &TrackerWindows {
        &self.windows
    }
}

impl MeasurementTracker for FusedTracker {
    type Reading = [f64];

    fn observe(&mut self, timestamp: DateTime<Utc>, reading: &[f64]) -> Result<()> {
        self.predict_and_update(timestamp, reading)
    }

    fn estimate(&self) -> f64 {
        self.x
    }
}
