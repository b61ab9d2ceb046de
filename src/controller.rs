//! Adaptive Controller - one tracker and one interval policy per stream
//!
//! Each observation runs a predict/update cycle on the tracker, then asks
//! the policy for the next interval. A controller is exclusively owned by
//! the loop driving its stream; nothing is shared between streams.

use chrono::{DateTime, Utc};
use log::info;

use crate::config::SystemConfig;
use crate::error::Result;
use crate::fusion::{FusedTracker, FUSED_NAME};
use crate::policy::{IntervalPolicy, Strategy, StrategyKind};
use crate::tracker::InnovationTracker;
use crate::traits::MeasurementTracker;

pub struct AdaptiveController<T: MeasurementTracker = InnovationTracker> {
    name: &'static str,
    policy: IntervalPolicy,
    observations: u64,
    tracker: T,
}

impl<T: MeasurementTracker> AdaptiveController<T> {
    pub fn new(tracker: T, policy: IntervalPolicy) -> Self {
        let name = policy.name();
        Self::with_name(name, tracker, policy)
    }

    pub fn with_name(name: &'static str, tracker: T, policy: IntervalPolicy) -> Self {
        info!("=== Adaptive Controller: {} ===", name);
        match policy.strategy() {
            Strategy::Chameleon { mode, oversampling_cap } => {
                info!("Mode: {:?}, oversampling cap: {:?}", mode, oversampling_cap);
            }
            Strategy::Baseline { theta, lambda } => {
                info!("Mode: additive (theta={}, lambda={})", theta, lambda);
            }
        }
        let windows = tracker.windows();
        info!("Windows: error={}, nyquist={}", windows.errors().capacity(), windows.samples().capacity());
        info!("Interval: initial={}ms, range={}ms", policy.state().initial_ms, policy.state().range_ms);

        AdaptiveController { name, policy, observations: 0, tracker }
    }
}

impl AdaptiveController<InnovationTracker> {
    /// Single-sensor controller for `kind`, or `None` for the fixed-rate
    /// strategy.
    pub fn for_strategy(config: &SystemConfig, kind: StrategyKind) -> Option<Self> {
        let policy = IntervalPolicy::for_strategy(kind, &config.controller, &config.sampling)?;
        let tracker = InnovationTracker::new(
            &config.filter, config.controller.window_size, config.controller.nyquist_window);
        Some(Self::new(tracker, policy))
    }
}

impl AdaptiveController<FusedTracker> {
    /// Multi-sensor controller seeded from the first readings.
    pub fn fused(config: &SystemConfig, initial_readings: &[f64]) -> Result<Self> {
        let tracker = FusedTracker::new(
            &config.fusion, initial_readings, config.controller.window_size, config.controller.nyquist_window)?;
        let policy = IntervalPolicy::chameleon(
            config.controller.mode(),
            config.controller.oversampling_cap(),
            config.controller.initial_interval_ms as f64,
            config.sampling.gathering_range_ms(),
        );
        Ok(Self::with_name(FUSED_NAME, tracker, policy))
    }
}

impl<T: MeasurementTracker> AdaptiveController<T> {
    /// Feeds one observation and returns the next interval in seconds.
    ///
    /// A numeric failure in the tracker is returned as-is; the policy is
    /// not consulted for that step.
    pub fn observe(&mut self, timestamp: DateTime<Utc>, reading: &T::Reading) -> Result<f64> {
        self.tracker.observe(timestamp, reading)?;
        self.observations += 1;
        Ok(self.policy.next_interval(&self.tracker))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn estimate(&self) -> f64 {
        self.tracker.estimate()
    }

    pub fn current_interval_secs(&self) -> f64 {
        self.policy.current_interval_secs()
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn policy(&self) -> &IntervalPolicy {
        &self.policy
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }
}
