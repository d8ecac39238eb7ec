//! ACT-R memory model: activation decay, recall probability, optimal
//! review interval search.
//!
//! - Activation: `A = ln(Σ w_j * t_j^(-d))`
//!   - `t_j`: time since j-th review (seconds)
//!   - `d`: decay rate (typically 0.5)
//!   - `w_j`: weight (1.0 for correct, `ERROR_PENALTY` for incorrect)
//! - Recall probability: `P = 1 / (1 + exp(-(A-τ)/s))`
//!   - `τ`: recall threshold, `s`: noise scale
//!
//! References: Anderson & Lebiere (1998); Pavlik & Anderson (2005).

use serde::{Deserialize, Serialize};

/// Incorrect retrieval attempts strengthen memory less than correct ones.
const ERROR_PENALTY: f64 = 0.3;

const DEFAULT_DECAY: f64 = 0.5;
const DEFAULT_THRESHOLD: f64 = 0.3;
const DEFAULT_NOISE_SCALE: f64 = 0.4;

/// Floor on age to avoid `log(0)`.
const MIN_TIME: f64 = 1e-3;

const MAX_SEARCH_SECONDS: f64 = 7.0 * 24.0 * 3600.0;
const MAX_SEARCH_ITERATIONS: usize = 60;
const DEFAULT_TOLERANCE: f64 = 1e-3;

/// A single review outcome, `timestamp` given as seconds ago from now.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryTrace {
    pub timestamp: f64,
    pub is_correct: bool,
}

#[derive(Clone, Debug)]
pub struct ActivationResult {
    pub base_activation: f64,
    pub activation: f64,
    pub recall_probability: f64,
}

#[derive(Clone, Debug)]
pub struct RecallPrediction {
    pub activation: f64,
    pub recall_probability: f64,
    pub confidence: f64,
}

#[derive(Clone, Debug)]
pub struct IntervalPrediction {
    pub optimal_seconds: f64,
    pub min_seconds: f64,
    pub max_seconds: f64,
    pub target_recall: f64,
}

/// Per-user ACT-R parameters, tuned by the personalized threshold learner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActrModel {
    pub decay: f64,
    pub threshold: f64,
    pub noise_scale: f64,
    pub update_count: u32,
}

impl Default for ActrModel {
    fn default() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            threshold: DEFAULT_THRESHOLD,
            noise_scale: DEFAULT_NOISE_SCALE,
            update_count: 0,
        }
    }
}

impl ActrModel {
    pub fn new(decay: Option<f64>, threshold: Option<f64>, noise_scale: Option<f64>) -> Self {
        Self {
            decay: decay.unwrap_or(DEFAULT_DECAY),
            threshold: threshold.unwrap_or(DEFAULT_THRESHOLD),
            noise_scale: noise_scale.unwrap_or(DEFAULT_NOISE_SCALE),
            update_count: 0,
        }
    }

    pub fn compute_activation(&self, traces: &[MemoryTrace]) -> f64 {
        compute_activation_static(traces, self.decay)
    }

    pub fn compute_recall_probability(&self, activation: f64) -> f64 {
        compute_recall_probability_static(activation, self.threshold, self.noise_scale)
    }

    pub fn compute_recall_probability_with_params(
        &self,
        activation: f64,
        threshold: f64,
        noise_scale: f64,
    ) -> f64 {
        compute_recall_probability_static(activation, threshold, noise_scale)
    }

    /// Personalize decay from a cognitive profile: better memory slows decay,
    /// faster processing speeds it up, stability damps both toward default.
    pub fn compute_personalized_decay(
        &self,
        memory_factor: f64,
        speed_factor: f64,
        stability_factor: f64,
    ) -> f64 {
        let base_decay = self.decay;

        let mem_factor = 1.0 - memory_factor.clamp(0.0, 1.0) * 0.3;
        let speed_factor_adj = 1.0 + speed_factor.clamp(0.0, 1.0) * 0.2;

        let stability = stability_factor.clamp(0.0, 1.0);
        let damping_factor = 0.3 + stability * 0.7;

        let personalized_decay = base_decay * mem_factor * speed_factor_adj;
        let final_decay = base_decay * damping_factor + personalized_decay * (1.0 - damping_factor);

        final_decay.clamp(0.3, 0.7)
    }

    /// Binary search for the interval at which recall probability drops to `target`.
    pub fn compute_optimal_interval(&self, traces: &[MemoryTrace], target_probability: f64) -> f64 {
        self.compute_optimal_interval_with_decay(traces, target_probability, self.decay)
    }

    pub fn compute_optimal_interval_with_decay(
        &self,
        traces: &[MemoryTrace],
        target_probability: f64,
        decay: f64,
    ) -> f64 {
        compute_optimal_interval_static(
            traces,
            target_probability.clamp(0.01, 0.99),
            decay,
            self.threshold,
            self.noise_scale,
            DEFAULT_TOLERANCE,
            MAX_SEARCH_SECONDS,
        )
    }

    pub fn compute_full_activation(&self, traces: &[MemoryTrace]) -> ActivationResult {
        if traces.is_empty() {
            return ActivationResult {
                base_activation: f64::NEG_INFINITY,
                activation: f64::NEG_INFINITY,
                recall_probability: 0.0,
            };
        }

        let base_activation = compute_activation_static(traces, self.decay);
        if !base_activation.is_finite() {
            return ActivationResult {
                base_activation: f64::NEG_INFINITY,
                activation: f64::NEG_INFINITY,
                recall_probability: 0.0,
            };
        }

        let noise = sample_standard_normal() * self.noise_scale;
        let activation = base_activation + noise;
        let recall_probability = self.compute_recall_probability(activation);

        ActivationResult {
            base_activation,
            activation,
            recall_probability,
        }
    }

    pub fn predict_recall(&self, traces: &[MemoryTrace]) -> RecallPrediction {
        if traces.is_empty() {
            return RecallPrediction {
                activation: f64::NEG_INFINITY,
                recall_probability: 0.0,
                confidence: 0.0,
            };
        }

        let activation = compute_activation_static(traces, self.decay);
        let recall_probability = self.compute_recall_probability(activation);

        let review_count = traces.len() as f64;
        let time_span = if traces.len() > 1 {
            let max_time = traces.iter().map(|t| t.timestamp).fold(0.0_f64, f64::max);
            let min_time = traces.iter().map(|t| t.timestamp).fold(f64::INFINITY, f64::min);
            max_time - min_time
        } else {
            0.0
        };

        let count_factor = (review_count / 10.0).min(1.0);
        let time_factor = (time_span / (7.0 * 24.0 * 3600.0)).min(1.0);

        let base_single_review_confidence = 0.3;
        let raw_confidence = 0.5 * count_factor + 0.5 * time_factor;
        let confidence = if traces.len() == 1 {
            raw_confidence.max(base_single_review_confidence)
        } else {
            raw_confidence.clamp(0.0, 1.0)
        };

        RecallPrediction {
            activation,
            recall_probability,
            confidence,
        }
    }

    pub fn predict_optimal_interval(
        &self,
        traces: &[MemoryTrace],
        target_recall: Option<f64>,
    ) -> IntervalPrediction {
        let target = target_recall.unwrap_or(0.9).clamp(0.01, 0.99);

        let optimal_seconds = self.compute_optimal_interval(traces, target);

        let high_target = (target + 0.1).min(0.95);
        let min_seconds = self.compute_optimal_interval(traces, high_target);

        let low_target = (target - 0.15).max(0.5);
        let max_seconds = self.compute_optimal_interval(traces, low_target);

        const MIN_INTERVAL: f64 = 3600.0;
        const MAX_INTERVAL: f64 = 30.0 * 24.0 * 3600.0;

        IntervalPrediction {
            optimal_seconds: optimal_seconds.clamp(MIN_INTERVAL, MAX_INTERVAL),
            min_seconds: min_seconds.clamp(MIN_INTERVAL, MAX_INTERVAL),
            max_seconds: max_seconds.clamp(MIN_INTERVAL, MAX_INTERVAL),
            target_recall: target,
        }
    }

    pub fn compute_memory_strength(&self, traces: &[MemoryTrace]) -> f64 {
        let activation = compute_activation_static(traces, self.decay);
        if !activation.is_finite() {
            return 0.0;
        }
        self.compute_recall_probability(activation)
    }

    pub fn update(&mut self) {
        self.update_count += 1;
    }

    pub fn reset(&mut self) {
        self.update_count = 0;
    }

    pub fn set_decay(&mut self, decay: f64) {
        self.decay = decay.clamp(0.1, 1.0);
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }
}

fn compute_activation_static(traces: &[MemoryTrace], decay: f64) -> f64 {
    if traces.is_empty() {
        return f64::NEG_INFINITY;
    }

    let sum: f64 = traces
        .iter()
        .map(|t| {
            let age = t.timestamp.max(MIN_TIME);
            let weight = if t.is_correct { 1.0 } else { ERROR_PENALTY };
            weight * age.powf(-decay)
        })
        .sum();

    if sum > 0.0 && sum.is_finite() {
        sum.ln()
    } else {
        f64::NEG_INFINITY
    }
}

fn compute_recall_probability_static(activation: f64, threshold: f64, noise_scale: f64) -> f64 {
    if !activation.is_finite() {
        return 0.0;
    }

    let s = noise_scale.max(1e-6);
    let z = (activation - threshold) / s;
    let prob = 1.0 / (1.0 + (-z).exp());

    if prob.is_finite() {
        prob.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn compute_optimal_interval_static(
    traces: &[MemoryTrace],
    target: f64,
    decay: f64,
    threshold: f64,
    noise_scale: f64,
    tolerance: f64,
    max_search_seconds: f64,
) -> f64 {
    let current_activation = compute_activation_static(traces, decay);
    if !current_activation.is_finite() {
        return 0.0;
    }

    let current_prob = compute_recall_probability_static(current_activation, threshold, noise_scale);
    if current_prob <= target {
        return 0.0;
    }

    let mut low = 0.0;
    let mut high = max_search_seconds;

    for _ in 0..MAX_SEARCH_ITERATIONS {
        let mid = (low + high) / 2.0;

        let future_traces: Vec<MemoryTrace> = traces
            .iter()
            .map(|t| MemoryTrace {
                timestamp: t.timestamp + mid,
                is_correct: t.is_correct,
            })
            .collect();

        let future_activation = compute_activation_static(&future_traces, decay);
        let future_prob = compute_recall_probability_static(future_activation, threshold, noise_scale);

        if (future_prob - target).abs() < tolerance {
            return mid;
        }

        if future_prob > target {
            low = mid;
        } else {
            high = mid;
        }
    }

    (low + high) / 2.0
}

fn sample_standard_normal() -> f64 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Standalone activation helper for callers that don't need model state.
pub fn compute_activation(traces: &[MemoryTrace], decay: Option<f64>) -> f64 {
    compute_activation_static(traces, decay.unwrap_or(DEFAULT_DECAY))
}

pub fn compute_recall_probability(
    activation: f64,
    threshold: Option<f64>,
    noise_scale: Option<f64>,
) -> f64 {
    compute_recall_probability_static(
        activation,
        threshold.unwrap_or(DEFAULT_THRESHOLD),
        noise_scale.unwrap_or(DEFAULT_NOISE_SCALE),
    )
}

pub fn compute_optimal_interval(
    traces: &[MemoryTrace],
    target_probability: f64,
    decay: Option<f64>,
    threshold: Option<f64>,
    noise_scale: Option<f64>,
) -> f64 {
    compute_optimal_interval_static(
        traces,
        target_probability.clamp(0.01, 0.99),
        decay.unwrap_or(DEFAULT_DECAY),
        threshold.unwrap_or(DEFAULT_THRESHOLD),
        noise_scale.unwrap_or(DEFAULT_NOISE_SCALE),
        DEFAULT_TOLERANCE,
        MAX_SEARCH_SECONDS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-10;

    fn default_model() -> ActrModel {
        ActrModel::default()
    }

    #[test]
    fn default_initialization() {
        let model = default_model();
        assert!((model.decay - 0.5).abs() < EPSILON);
        assert!((model.threshold - 0.3).abs() < EPSILON);
        assert!((model.noise_scale - 0.4).abs() < EPSILON);
        assert_eq!(model.update_count, 0);
    }

    #[test]
    fn custom_initialization() {
        let model = ActrModel::new(Some(0.6), Some(0.4), Some(0.3));
        assert!((model.decay - 0.6).abs() < EPSILON);
        assert!((model.threshold - 0.4).abs() < EPSILON);
        assert!((model.noise_scale - 0.3).abs() < EPSILON);
    }

    #[test]
    fn empty_traces_return_neg_infinity() {
        let model = default_model();
        let activation = model.compute_activation(&[]);
        assert!(activation.is_infinite() && activation < 0.0);
    }

    #[test]
    fn recent_trace_has_higher_activation_than_old() {
        let model = default_model();

        let recent = vec![MemoryTrace { timestamp: 60.0, is_correct: true }];
        let old = vec![MemoryTrace { timestamp: 604800.0, is_correct: true }];

        assert!(model.compute_activation(&recent) > model.compute_activation(&old));
    }

    #[test]
    fn multiple_traces_accumulate_activation() {
        let model = default_model();

        let single = vec![MemoryTrace { timestamp: 3600.0, is_correct: true }];
        let multiple = vec![
            MemoryTrace { timestamp: 3600.0, is_correct: true },
            MemoryTrace { timestamp: 7200.0, is_correct: true },
            MemoryTrace { timestamp: 10800.0, is_correct: true },
        ];

        assert!(model.compute_activation(&multiple) > model.compute_activation(&single));
    }

    #[test]
    fn error_penalty_reduces_activation() {
        let model = default_model();

        let correct = vec![MemoryTrace { timestamp: 3600.0, is_correct: true }];
        let incorrect = vec![MemoryTrace { timestamp: 3600.0, is_correct: false }];

        let correct_activation = model.compute_activation(&correct);
        let incorrect_activation = model.compute_activation(&incorrect);
        assert!(incorrect_activation < correct_activation);

        let expected_diff = (1.0_f64).ln() - ERROR_PENALTY.ln();
        assert!((correct_activation - incorrect_activation - expected_diff).abs() < EPSILON);
    }

    #[test]
    fn recall_probability_is_monotonic_in_activation() {
        let model = default_model();
        let prob_low = model.compute_recall_probability(-2.0);
        let prob_mid = model.compute_recall_probability(0.0);
        let prob_high = model.compute_recall_probability(2.0);
        assert!(prob_low < prob_mid);
        assert!(prob_mid < prob_high);
    }

    #[test]
    fn recall_probability_at_threshold_is_half() {
        let model = default_model();
        let prob = model.compute_recall_probability(model.threshold);
        assert!((prob - 0.5).abs() < 0.01);
    }

    #[test]
    fn recall_probability_of_neg_infinity_is_zero() {
        let model = default_model();
        assert!((model.compute_recall_probability(f64::NEG_INFINITY) - 0.0).abs() < EPSILON);
    }

    #[test]
    fn personalized_decay_stays_in_bounds() {
        let model = default_model();
        let decay = model.compute_personalized_decay(0.5, 0.5, 0.5);
        assert!((0.3..=0.7).contains(&decay));

        let decay_extreme_low = model.compute_personalized_decay(0.0, 0.0, 0.0);
        let decay_extreme_high = model.compute_personalized_decay(1.0, 1.0, 1.0);
        assert!((0.3..=0.7).contains(&decay_extreme_low));
        assert!((0.3..=0.7).contains(&decay_extreme_high));
    }

    #[test]
    fn higher_memory_factor_lowers_decay() {
        let model = default_model();
        let default_decay = model.compute_personalized_decay(0.5, 0.5, 0.0);
        let high_memory_decay = model.compute_personalized_decay(1.0, 0.5, 0.0);
        assert!(high_memory_decay < default_decay);
    }

    #[test]
    fn higher_speed_factor_raises_decay() {
        let model = default_model();
        let default_decay = model.compute_personalized_decay(0.5, 0.5, 0.0);
        let high_speed_decay = model.compute_personalized_decay(0.5, 1.0, 0.0);
        assert!(high_speed_decay > default_decay);
    }

    #[test]
    fn optimal_interval_is_nonnegative() {
        let model = default_model();
        let traces = vec![
            MemoryTrace { timestamp: 60.0, is_correct: true },
            MemoryTrace { timestamp: 3600.0, is_correct: true },
        ];
        assert!(model.compute_optimal_interval(&traces, 0.9) >= 0.0);
    }

    #[test]
    fn lower_target_gives_longer_interval() {
        let model = default_model();
        let traces = vec![
            MemoryTrace { timestamp: 60.0, is_correct: true },
            MemoryTrace { timestamp: 3600.0, is_correct: true },
            MemoryTrace { timestamp: 86400.0, is_correct: true },
        ];

        let interval_90 = model.compute_optimal_interval(&traces, 0.9);
        let interval_70 = model.compute_optimal_interval(&traces, 0.7);
        assert!(interval_70 >= interval_90);
    }

    #[test]
    fn optimal_interval_empty_traces_is_zero() {
        let model = default_model();
        assert!((model.compute_optimal_interval(&[], 0.9) - 0.0).abs() < EPSILON);
    }

    #[test]
    fn predict_optimal_interval_bounds_are_ordered() {
        let model = default_model();
        let traces = vec![
            MemoryTrace { timestamp: 60.0, is_correct: true },
            MemoryTrace { timestamp: 3600.0, is_correct: true },
        ];

        let prediction = model.predict_optimal_interval(&traces, Some(0.9));
        assert!(prediction.min_seconds <= prediction.optimal_seconds);
        assert!(prediction.optimal_seconds <= prediction.max_seconds);
        assert!((prediction.target_recall - 0.9).abs() < EPSILON);
    }

    #[test]
    fn predict_recall_confidence_grows_with_history() {
        let model = default_model();

        let single = vec![MemoryTrace { timestamp: 3600.0, is_correct: true }];
        let long: Vec<MemoryTrace> = (1..=8)
            .map(|i| MemoryTrace { timestamp: i as f64 * 86400.0, is_correct: true })
            .collect();

        let single_prediction = model.predict_recall(&single);
        let long_prediction = model.predict_recall(&long);

        assert!(long_prediction.confidence >= single_prediction.confidence);
        assert!(single_prediction.confidence >= 0.3);
    }

    #[test]
    fn memory_strength_is_a_probability() {
        let model = default_model();
        let traces = vec![MemoryTrace { timestamp: 3600.0, is_correct: true }];
        let strength = model.compute_memory_strength(&traces);
        assert!((0.0..=1.0).contains(&strength));
        assert!((model.compute_memory_strength(&[]) - 0.0).abs() < EPSILON);
    }

    #[test]
    fn update_and_reset_track_count() {
        let mut model = default_model();
        assert_eq!(model.update_count, 0);
        model.update();
        model.update();
        assert_eq!(model.update_count, 2);
        model.reset();
        assert_eq!(model.update_count, 0);
    }

    #[test]
    fn activation_formula_matches_closed_form() {
        let model = ActrModel::new(Some(0.5), Some(0.3), Some(0.4));
        let traces = vec![MemoryTrace { timestamp: 100.0, is_correct: true }];
        let activation = model.compute_activation(&traces);
        let expected = (100.0_f64.powf(-0.5)).ln();
        assert!((activation - expected).abs() < EPSILON);
    }

    #[test]
    fn recall_probability_formula_matches_closed_form() {
        let model = ActrModel::new(Some(0.5), Some(0.3), Some(0.4));
        let prob = model.compute_recall_probability(0.5);
        let expected = 1.0 / (1.0 + (-0.5_f64).exp());
        assert!((prob - expected).abs() < EPSILON);
    }

    #[test]
    fn error_penalty_formula_matches_closed_form() {
        let model = ActrModel::new(Some(0.5), Some(0.3), Some(0.4));
        let traces = vec![MemoryTrace { timestamp: 100.0, is_correct: false }];
        let activation = model.compute_activation(&traces);
        let expected = (ERROR_PENALTY * 100.0_f64.powf(-0.5)).ln();
        assert!((activation - expected).abs() < EPSILON);
    }

    #[test]
    fn standalone_helpers_match_model_defaults() {
        let traces = vec![MemoryTrace { timestamp: 3600.0, is_correct: true }];
        let a1 = compute_activation(&traces, None);
        let a2 = compute_activation(&traces, Some(0.5));
        assert!((a1 - a2).abs() < EPSILON);

        let p1 = compute_recall_probability(0.5, None, None);
        let p2 = compute_recall_probability(0.5, Some(0.3), Some(0.4));
        assert!((p1 - p2).abs() < EPSILON);

        assert!(compute_optimal_interval(&traces, 0.9, None, None, None) >= 0.0);
    }
}
