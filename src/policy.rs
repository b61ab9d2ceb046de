//! Interval Policy - decides the next sampling interval
//!
//! Two strategies share the same interval state:
//! - Chameleon: exponential growth/decay search driven by the innovation
//!   window, optionally bounded by the Nyquist analysis.
//! - Baseline: additive update `θ(1 − e^((wte+λ)/λ))`, kept only as a
//!   comparison reference. It shrinks monotonically.
//!
//! Intervals are tracked in milliseconds; `next_interval` returns seconds.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{ControllerConfig, SamplingConfig};
use crate::traits::InnovationSource;

// ============================================================================
// CONSTANTS
// ============================================================================

const DECAY_BASE: f64 = 0.75;              // 1 - 0.25
const GROWTH_BASE: f64 = 1.25;             // 1 + 0.25
const ERROR_DELTA_THRESHOLD: f64 = 0.6;    // sharp degradation
const SIMILARITY_THRESHOLD: f64 = 0.24;    // sustained predictability
const UPPER_LIMIT_FACTOR: f64 = 1.5;
const LOWER_LIMIT_FACTOR: f64 = 0.5;

pub const BASELINE_THETA: f64 = 2.0;
pub const BASELINE_LAMBDA: f64 = 0.6;

/// Which inputs drive a Chameleon policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzerMode {
    AnalyzerOnly,
    ProfilerOnly,
    AnalyzerWithProfiler,
}

/// Sampling strategy selectable per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Fixed,
    Baseline,
    Chameleon,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Fixed => "fixed",
            StrategyKind::Baseline => "baseline",
            StrategyKind::Chameleon => "chameleon",
        }
    }
}

// ============================================================================
// INTERVAL STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalState {
    pub current_ms: f64,
    pub received_ms: f64,
    pub initial_ms: f64,
    pub range_ms: f64,
    pub decrease_counter: u32,
    pub increase_counter: u32,
}

impl IntervalState {
    pub fn new(initial_ms: f64, range_ms: f64) -> Self {
        IntervalState {
            current_ms: initial_ms,
            received_ms: initial_ms,
            initial_ms,
            range_ms,
            decrease_counter: 1,
            increase_counter: 1,
        }
    }

    pub fn lower_limit_ms(&self) -> f64 {
        self.initial_ms * LOWER_LIMIT_FACTOR
    }

    pub fn upper_limit_ms(&self) -> f64 {
        self.initial_ms * UPPER_LIMIT_FACTOR
    }

    /// Soft clamp around the received interval.
    pub fn within_range(&self, candidate_ms: f64) -> bool {
        let half = self.range_ms / 2.0;
        (self.received_ms - half..=self.received_ms + half).contains(&candidate_ms)
    }

    /// `initial × 0.75^dec`, or the current interval if that is not finite.
    pub fn decay_candidate(&mut self) -> f64 {
        let candidate = self.initial_ms * DECAY_BASE.powf(self.decrease_counter as f64);
        if !candidate.is_finite() {
            return self.current_ms;
        }
        self.decrease_counter = self.decrease_counter.saturating_add(1);
        self.increase_counter = 1;
        candidate
    }

    /// `initial × 1.25^inc`, or the current interval if that overflows.
    pub fn growth_candidate(&mut self) -> f64 {
        let candidate = self.initial_ms * GROWTH_BASE.powf(self.increase_counter as f64);
        if !candidate.is_finite() {
            return self.current_ms;
        }
        self.increase_counter = self.increase_counter.saturating_add(1);
        self.decrease_counter = 1;
        candidate
    }
}

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Baseline { theta: f64, lambda: f64 },
    Chameleon { mode: AnalyzerMode, oversampling_cap: Option<f64> },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Baseline { .. } => StrategyKind::Baseline.name(),
            Strategy::Chameleon { .. } => StrategyKind::Chameleon.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntervalPolicy {
    strategy: Strategy,
    state: IntervalState,
}

impl IntervalPolicy {
    pub fn new(strategy: Strategy, initial_ms: f64, range_ms: f64) -> Self {
        IntervalPolicy { strategy, state: IntervalState::new(initial_ms, range_ms) }
    }

    pub fn baseline(initial_ms: f64, range_ms: f64) -> Self {
        Self::new(Strategy::Baseline { theta: BASELINE_THETA, lambda: BASELINE_LAMBDA }, initial_ms, range_ms)
    }

    pub fn chameleon(mode: AnalyzerMode, oversampling_cap: Option<f64>, initial_ms: f64, range_ms: f64) -> Self {
        Self::new(Strategy::Chameleon { mode, oversampling_cap }, initial_ms, range_ms)
    }

    /// Builds the policy for an adaptive strategy. `Fixed` has no policy.
    pub fn for_strategy(kind: StrategyKind, controller: &ControllerConfig, sampling: &SamplingConfig) -> Option<Self> {
        let initial_ms = controller.initial_interval_ms as f64;
        let range_ms = sampling.gathering_range_ms();
        match kind {
            StrategyKind::Fixed => None,
            StrategyKind::Baseline => Some(Self::baseline(initial_ms, range_ms)),
            StrategyKind::Chameleon => Some(Self::chameleon(
                controller.mode(), controller.oversampling_cap(), initial_ms, range_ms)),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn state(&self) -> &IntervalState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut IntervalState {
        &mut self.state
    }

    pub fn current_interval_secs(&self) -> f64 {
        self.state.current_ms / 1000.0
    }

    /// Next sampling interval in seconds, given the latest innovation
    /// statistics.
    pub fn next_interval<S: InnovationSource + ?Sized>(&mut self, source: &S) -> f64 {
        match self.strategy {
            Strategy::Baseline { theta, lambda } => self.baseline_step(source, theta, lambda),
            Strategy::Chameleon { mode, oversampling_cap } => match mode {
                AnalyzerMode::ProfilerOnly => {
                    let (lower, upper) = (self.state.lower_limit_ms(), self.state.upper_limit_ms());
                    self.recompute(source, lower, upper);
                }
                AnalyzerMode::AnalyzerWithProfiler => {
                    let verdict = source.windows()
                        .nyquist_check(self.state.upper_limit_ms(), oversampling_cap);
                    let lower = self.state.lower_limit_ms();
                    self.recompute(source, lower, verdict.upper_bound_ms);
                }
                AnalyzerMode::AnalyzerOnly => {
                    let verdict = source.windows()
                        .nyquist_check(self.state.upper_limit_ms(), oversampling_cap);
                    if verdict.oversampled {
                        self.state.current_ms = verdict.upper_bound_ms;
                    }
                }
            },
        }
        debug!("[Policy] {} interval={:.1}ms (dec={}, inc={})",
               self.name(), self.state.current_ms, self.state.decrease_counter, self.state.increase_counter);
        self.current_interval_secs()
    }

    fn recompute<S: InnovationSource + ?Sized>(&mut self, source: &S, lower_ms: f64, upper_ms: f64) {
        let windows = source.windows();
        let candidate = if windows.error_delta() > ERROR_DELTA_THRESHOLD {
            let c = self.state.decay_candidate();
            if c < lower_ms { lower_ms } else { c }
        } else if windows.weighted_total_error() < SIMILARITY_THRESHOLD {
            let c = self.state.growth_candidate();
            if c > upper_ms { upper_ms } else { c }
        } else {
            return;
        };

        if self.state.within_range(candidate) {
            self.state.current_ms = candidate;
        } else {
            debug!("[Policy] candidate {:.1}ms outside range {:.1}±{:.1}ms, keeping {:.1}ms",
                   candidate, self.state.received_ms, self.state.range_ms / 2.0, self.state.current_ms);
        }
    }

    fn baseline_step<S: InnovationSource + ?Sized>(&mut self, source: &S, theta: f64, lambda: f64) {
        let wte = source.windows().weighted_total_error();
        let theta_part = theta * (1.0 - ((wte + lambda) / lambda).exp());
        let candidate = self.state.current_ms + theta_part;
        if self.state.within_range(candidate) {
            self.state.current_ms = candidate.trunc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerWindows;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct Errors(TrackerWindows);

    impl Errors {
        fn new() -> Self {
            Errors(TrackerWindows::new(10, 10))
        }

        fn push(&mut self, e: f64) -> &mut Self {
            self.0.push_error(e);
            self
        }
    }

    impl InnovationSource for Errors {
        fn windows(&self) -> &TrackerWindows {
            &self.0
        }
    }

    fn profiler() -> IntervalPolicy {
        IntervalPolicy::chameleon(AnalyzerMode::ProfilerOnly, None, 4_000.0, 8_000.0)
    }

    #[test]
    fn test_growth_on_quiet_errors() {
        let mut p = profiler();
        let quiet = Errors::new();
        assert_abs_diff_eq!(p.next_interval(&quiet), 5.0, epsilon = 1e-12);
        assert_eq!(p.state().increase_counter, 2);
        // 4000 × 1.25² = 6250 > 6000, clamped
        assert_abs_diff_eq!(p.next_interval(&quiet), 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.next_interval(&quiet), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_decay_on_error_spike() {
        let mut p = profiler();
        let mut spike = Errors::new();
        spike.push(0.0).push(0.9);
        assert_abs_diff_eq!(p.next_interval(&spike), 3.0, epsilon = 1e-12);
        assert_eq!(p.state().decrease_counter, 2);
        assert_eq!(p.state().increase_counter, 1);
        // 4000 × 0.75² = 2250, then 0.75³ → 1687.5 < 2000
        assert_abs_diff_eq!(p.next_interval(&spike), 2.25, epsilon = 1e-12);
        assert_abs_diff_eq!(p.next_interval(&spike), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dead_zone_keeps_interval() {
        let mut p = profiler();
        let mut steady = Errors::new();
        for _ in 0..10 {
            steady.push(0.5);
        }
        assert_abs_diff_eq!(p.next_interval(&steady), 4.0, epsilon = 1e-12);
        assert_eq!(p.state().decrease_counter, 1);
        assert_eq!(p.state().increase_counter, 1);
    }

    #[test]
    fn test_profiler_clamp_and_momentum_exclusivity() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut p = profiler();
        let mut errors = Errors::new();
        for step in 0..2_000 {
            errors.push(rng.random::<f64>() * 1.2);
            let secs = p.next_interval(&errors);
            assert!((2.0..=6.0).contains(&secs), "step {}: interval {}s left [2, 6]", step, secs);
            let s = p.state();
            assert!(s.decrease_counter == 1 || s.increase_counter == 1,
                "step {}: both counters active (dec={}, inc={})", step, s.decrease_counter, s.increase_counter);
        }
    }

    #[test]
    fn test_growth_overflow_keeps_current_interval() {
        let mut p = profiler();
        p.state_mut().increase_counter = 1_000_000_000;
        let secs = p.next_interval(&Errors::new());
        assert_abs_diff_eq!(secs, 4.0, epsilon = 1e-12);
        assert_eq!(p.state().increase_counter, 1_000_000_000, "counters untouched on overflow");
    }

    #[test]
    fn test_soft_range_rejects_far_candidates() {
        let mut p = IntervalPolicy::chameleon(AnalyzerMode::ProfilerOnly, None, 4_000.0, 1_000.0);
        // 5000 lies outside 4000 ± 500
        assert_abs_diff_eq!(p.next_interval(&Errors::new()), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_baseline_arithmetic() {
        let mut p = IntervalPolicy::baseline(4_000.0, 8_000.0);
        let quiet = Errors::new();
        // 4000 + 2(1 - e) = 3996.56 -> 3996
        assert_abs_diff_eq!(p.next_interval(&quiet), 3.996, epsilon = 1e-12);
        assert_abs_diff_eq!(p.next_interval(&quiet), 3.992, epsilon = 1e-12);
        assert_eq!(p.name(), "baseline");
    }

    #[test]
    fn test_baseline_out_of_range_is_ignored() {
        let mut p = IntervalPolicy::baseline(4_000.0, 4.0);
        assert_abs_diff_eq!(p.next_interval(&Errors::new()), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_analyzer_only_without_full_window_keeps_interval() {
        let mut p = IntervalPolicy::chameleon(AnalyzerMode::AnalyzerOnly, None, 4_000.0, 8_000.0);
        let mut spike = Errors::new();
        spike.push(0.0).push(0.9);
        assert_abs_diff_eq!(p.next_interval(&spike), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_analyzer_with_profiler_falls_back_to_upper_limit() {
        let mut p = IntervalPolicy::chameleon(AnalyzerMode::AnalyzerWithProfiler, None, 4_000.0, 8_000.0);
        let quiet = Errors::new();
        p.next_interval(&quiet);
        p.next_interval(&quiet);
        assert_abs_diff_eq!(p.next_interval(&quiet), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_for_strategy() {
        let controller = ControllerConfig::default();
        let sampling = SamplingConfig::default();
        assert!(IntervalPolicy::for_strategy(StrategyKind::Fixed, &controller, &sampling).is_none());
        let p = IntervalPolicy::for_strategy(StrategyKind::Chameleon, &controller, &sampling).unwrap();
        assert_eq!(p.strategy(), Strategy::Chameleon { mode: AnalyzerMode::AnalyzerWithProfiler, oversampling_cap: None });
        assert_eq!(p.state().range_ms, 8_000.0);
    }
}
