use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SamplerError;
use crate::policy::AnalyzerMode;
use crate::signals::DEFAULT_MEASUREMENTS;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    pub controller: ControllerConfig,
    pub filter: FilterConfig,
    pub fusion: FusionConfig,
    pub sampling: SamplingConfig,
}

/// Per-stream controller settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub nyquist_window: usize,
    pub window_size: usize,
    pub use_filter: bool,         // profiler (innovation) path enabled
    pub use_only_filter: bool,    // profiler without the analyzer
    pub constrain_analyzer: bool,
    pub max_oversampling: f64,
    pub initial_interval_ms: u64,
}

/// Fixed 3-state filter model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub dt: f64,
    pub process_noise: [[f64; 3]; 3],
    pub measurement_noise: f64,
    pub initial_covariance: [[f64; 3]; 3],
    pub initial_state: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    pub measurement_noise: f64, // per sensor
    pub process_noise: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub artificial_cutoff: bool,
    pub gathering_range_s: f64, // soft clamp around the received interval; values < 1000 are read as seconds
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            nyquist_window: 10,
            window_size: 10,
            use_filter: true,
            use_only_filter: false,
            constrain_analyzer: false,
            max_oversampling: 1.0,
            initial_interval_ms: 4_000,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        let m0 = DEFAULT_MEASUREMENTS[0];
        FilterConfig {
            dt: 0.0333, // ~30 Hz nominal step, independent of the real interval
            process_noise: [[0.05, 0.05, 0.0], [0.05, 0.05, 0.0], [0.0, 0.0, 0.0]],
            measurement_noise: 5.0,
            initial_covariance: [[0.1, 0.1, 0.1], [0.1, 10_000.0, 10.0], [0.1, 10.0, 100.0]],
            initial_state: [0.0, m0, m0],
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig {
            measurement_noise: 0.64,
            process_noise: 0.005,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            artificial_cutoff: false,
            gathering_range_s: 8.0,
        }
    }
}

impl ControllerConfig {
    /// Chameleon mode implied by the flag combination.
    ///
    /// `use_only_filter` wins; a constrained analyzer always runs together
    /// with the profiler.
    pub fn mode(&self) -> AnalyzerMode {
        if self.use_only_filter {
            AnalyzerMode::ProfilerOnly
        } else if self.use_filter || self.constrain_analyzer {
            AnalyzerMode::AnalyzerWithProfiler
        } else {
            AnalyzerMode::AnalyzerOnly
        }
    }

    /// Oversampling cap handed to the Nyquist check, if any.
    pub fn oversampling_cap(&self) -> Option<f64> {
        if self.constrain_analyzer {
            Some(self.max_oversampling)
        } else {
            None
        }
    }
}

impl SamplingConfig {
    pub fn gathering_range_ms(&self) -> f64 {
        if self.gathering_range_s < 1000.0 {
            self.gathering_range_s * 1000.0
        } else {
            self.gathering_range_s
        }
    }
}

impl SystemConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: SystemConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), SamplerError> {
        let c = &self.controller;
        if c.window_size < 2 {
            return Err(SamplerError::InvalidConfig(format!(
                "window_size must be >= 2, got {}", c.window_size)));
        }
        if c.nyquist_window < 2 {
            return Err(SamplerError::InvalidConfig(format!(
                "nyquist_window must be >= 2, got {}", c.nyquist_window)));
        }
        if c.initial_interval_ms == 0 {
            return Err(SamplerError::InvalidConfig("initial_interval_ms must be > 0".into()));
        }
        if !(c.max_oversampling.is_finite() && c.max_oversampling > 0.0) {
            return Err(SamplerError::InvalidConfig(format!(
                "max_oversampling must be > 0, got {}", c.max_oversampling)));
        }

        let f = &self.filter;
        let matrices_finite = f.process_noise.iter().flatten()
            .chain(f.initial_covariance.iter().flatten())
            .chain(f.initial_state.iter())
            .all(|v| v.is_finite());
        if !matrices_finite || !f.dt.is_finite() {
            return Err(SamplerError::InvalidConfig("filter model contains non-finite entries".into()));
        }
        if !(f.measurement_noise.is_finite() && f.measurement_noise >= 0.0) {
            return Err(SamplerError::InvalidConfig(format!(
                "measurement_noise must be >= 0, got {}", f.measurement_noise)));
        }

        let fu = &self.fusion;
        if fu.measurement_noise < 0.0 || fu.process_noise < 0.0 {
            return Err(SamplerError::InvalidConfig("fusion noise terms must be >= 0".into()));
        }

        if !(self.sampling.gathering_range_s.is_finite() && self.sampling.gathering_range_s > 0.0) {
            return Err(SamplerError::InvalidConfig("gathering_range_s must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = SystemConfig::default();
        assert_eq!(config.controller.window_size, 10);
        assert_eq!(config.controller.nyquist_window, 10);
        assert_eq!(config.controller.initial_interval_ms, 4_000);
        assert_eq!(config.filter.measurement_noise, 5.0);
        assert_eq!(config.filter.initial_state[1], DEFAULT_MEASUREMENTS[0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_selection_from_flags() {
        let mut c = ControllerConfig::default();
        assert_eq!(c.mode(), AnalyzerMode::AnalyzerWithProfiler);

        c.use_only_filter = true;
        assert_eq!(c.mode(), AnalyzerMode::ProfilerOnly);

        c.use_only_filter = false;
        c.use_filter = false;
        assert_eq!(c.mode(), AnalyzerMode::AnalyzerOnly);

        // Constraining the analyzer re-enables the profiler
        c.constrain_analyzer = true;
        assert_eq!(c.mode(), AnalyzerMode::AnalyzerWithProfiler);
        assert_eq!(c.oversampling_cap(), Some(1.0));
    }

    #[test]
    fn test_gathering_range_normalisation() {
        let mut s = SamplingConfig::default();
        assert_eq!(s.gathering_range_ms(), 8_000.0);
        s.gathering_range_s = 12_000.0;
        assert_eq!(s.gathering_range_ms(), 12_000.0);
    }

    #[test]
    fn test_validation_rejects_tiny_windows() {
        let mut config = SystemConfig::default();
        config.controller.window_size = 1;
        assert!(matches!(config.validate(), Err(SamplerError::InvalidConfig(_))));

        let mut config = SystemConfig::default();
        config.controller.nyquist_window = 0;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.filter.process_noise[0][0] = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"controller": {{"window_size": 6, "use_only_filter": true}}}}"#)
            .expect("write config");

        let config = SystemConfig::from_json_file(file.path()).expect("load config");
        assert_eq!(config.controller.window_size, 6);
        assert_eq!(config.controller.mode(), AnalyzerMode::ProfilerOnly);
        assert_eq!(config.controller.nyquist_window, 10, "unspecified fields keep defaults");
        assert_eq!(config.filter, FilterConfig::default());
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"controller": {{"window_size": 1}}}}"#).expect("write config");
        assert!(SystemConfig::from_json_file(file.path()).is_err());
    }
}
