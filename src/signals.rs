//! Deterministic synthetic signals on a one-second grid.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::f64::consts::PI;

use crate::error::Result;
use crate::series::UniformSeries;

/// Reference measurement fixture: a slow rise and fall with a spike.
pub const DEFAULT_MEASUREMENTS: [f64; 50] = [
    1.04202710058, 1.10726790452, 1.2913511148, 1.48485250951, 1.72825901034,
    1.74216489744, 2.11672039768, 2.14529225112, 2.16029641405, 2.21269371128,
    2.57709350237, 2.6682215744, 2.51641839428, 2.76034056782, 2.88131780617,
    2.88373786518, 2.9448468727, 2.82866600131, 3.0006601946, 3.12920591669,
    2.858361783, 2.83808170354, 2.68975330958, 2.66533185589, 2.81613499531,
    2.81003612051, 2.88321849354, 2.69789264832, 2.4342229249, 2.23464791825,
    2.30278776224, 2.02069770395, 1.94393985809, 1.82498398739, 1.52526230354,
    1.86967808173, 1.18073207847, 1.10729605087, 0.916168349913, 0.678547664519,
    0.562381751596, 0.355468474885, 500.0,
    300.0, 200.0, 0.355468474885, 0.572381751596, 0.658547664519, 0.916168349913,
    0.926168349913,
];

const STEP_LEN: usize = 80;
const STEP_AT: usize = 40;
const STEP_HIGH: f64 = 500.0;
const LINE_LEN: usize = 60;

/// Start of every generated series.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).single().unwrap_or_default()
}

/// `start, start + step, ...` below `stop`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

pub fn sine() -> Vec<f64> {
    arange(0.0, 4.0 * PI, 0.1).into_iter().map(f64::sin).collect()
}

pub fn cosine() -> Vec<f64> {
    arange(0.0, 4.0 * PI, 0.1).into_iter().map(f64::cos).collect()
}

pub fn sigmoid_increasing() -> Vec<f64> {
    arange(-20.0, 20.0, 0.1).into_iter().map(|x| 1.0 / (1.0 + (-x).exp())).collect()
}

pub fn sigmoid_decreasing() -> Vec<f64> {
    arange(-20.0, 20.0, 0.1).into_iter().map(|x| 1.0 / (1.0 + x.exp())).collect()
}

pub fn straight_line(len: usize, value: f64) -> Vec<f64> {
    vec![value; len]
}

/// `low` up to index `at`, `high` from there on.
pub fn step(len: usize, at: usize, low: f64, high: f64) -> Vec<f64> {
    (0..len).map(|i| if i < at { low } else { high }).collect()
}

/// `offset + sin(2πi / period)`, one value per grid step.
pub fn offset_sine(len: usize, period: f64, offset: f64) -> Vec<f64> {
    (0..len).map(|i| offset + (2.0 * PI * i as f64 / period).sin()).collect()
}

/// Named signals selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Signal {
    Sine,
    Cosine,
    Sigmoid,
    SigmoidDecr,
    Line,
    Step,
    Fixture,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::Sine => "sine",
            Signal::Cosine => "cosine",
            Signal::Sigmoid => "sigmoid",
            Signal::SigmoidDecr => "sigmoid-decr",
            Signal::Line => "straight-line",
            Signal::Step => "step",
            Signal::Fixture => "default-measurements",
        }
    }

    pub fn values(self) -> Vec<f64> {
        match self {
            Signal::Sine => sine(),
            Signal::Cosine => cosine(),
            Signal::Sigmoid => sigmoid_increasing(),
            Signal::SigmoidDecr => sigmoid_decreasing(),
            Signal::Line => straight_line(LINE_LEN, 1.0),
            Signal::Step => step(STEP_LEN, STEP_AT, 0.0, STEP_HIGH),
            Signal::Fixture => DEFAULT_MEASUREMENTS.to_vec(),
        }
    }

    pub fn series(self) -> Result<UniformSeries> {
        UniformSeries::from_values(self.name(), epoch(), Duration::seconds(1), &self.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths_match_ranges() {
        assert_eq!(sine().len(), 126);
        assert_eq!(cosine().len(), 126);
        assert_eq!(sigmoid_increasing().len(), 400);
        assert_eq!(DEFAULT_MEASUREMENTS.len(), 50);
    }

    #[test]
    fn test_step_jumps_at_index() {
        let s = step(80, 40, 0.0, 500.0);
        assert_eq!(s[39], 0.0);
        assert_eq!(s[40], 500.0);
    }

    #[test]
    fn test_sigmoids_are_monotonic() {
        let up = sigmoid_increasing();
        assert!(up.windows(2).all(|p| p[1] >= p[0]));
        let down = sigmoid_decreasing();
        assert!(down.windows(2).all(|p| p[1] <= p[0]));
    }

    #[test]
    fn test_series_on_one_second_grid() {
        let series = Signal::Fixture.series().unwrap();
        assert_eq!(series.len(), 50);
        assert_eq!(series.spacing(), Duration::seconds(1));
        assert_eq!(series.first_timestamp(), epoch());
        assert_eq!(series.name(), "default-measurements");
    }

    #[test]
    fn test_arange_rejects_empty_ranges() {
        assert!(arange(1.0, 0.0, 0.1).is_empty());
        assert!(arange(0.0, 1.0, 0.0).is_empty());
    }
}
