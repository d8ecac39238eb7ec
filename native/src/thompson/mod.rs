//! Thompson sampling with global + per-context Beta parameters.
//!
//! - Maintains Beta(alpha, beta) posteriors per action, and per (action,
//!   context) pair for personalization.
//! - Selection samples from each posterior and blends the global and
//!   contextual sample by how much contextual data exists yet.
//! - Positive feedback increments alpha, negative increments beta.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const EPSILON: f64 = 1e-10;
const MAX_GAMMA_ITERATIONS: usize = 1000;
const MAX_GAMMA_RECURSION: usize = 10;

/// Below this many contextual + global observations, confidence stays low.
const CONFIDENCE_SCALE: f64 = 20.0;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaParams {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha: alpha.max(EPSILON),
            beta: beta.max(EPSILON),
        }
    }

    pub fn expected_value(&self) -> f64 {
        let sum = self.alpha + self.beta;
        if sum > 0.0 {
            self.alpha / sum
        } else {
            0.5
        }
    }

    pub fn total(&self) -> f64 {
        self.alpha + self.beta
    }
}

#[derive(Clone, Debug)]
pub struct ActionSelection {
    pub action_key: String,
    pub score: f64,
    pub confidence: f64,
    pub global_sample: f64,
    pub contextual_sample: f64,
}

#[derive(Clone, Debug)]
pub struct ThompsonSamplingOptions {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub min_context_weight: f64,
    pub max_context_weight: f64,
    pub enable_soft_update: bool,
    pub seed: u64,
}

impl Default for ThompsonSamplingOptions {
    fn default() -> Self {
        Self {
            prior_alpha: 1.0,
            prior_beta: 1.0,
            min_context_weight: 0.35,
            max_context_weight: 0.75,
            enable_soft_update: false,
            seed: 42,
        }
    }
}

/// Plain-data snapshot for persistence; the caller owns serialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThompsonSnapshot {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub update_count: i64,
    pub global_params: HashMap<String, BetaParams>,
    pub context_params: HashMap<String, HashMap<String, BetaParams>>,
}

pub struct ThompsonModel {
    global_params: HashMap<String, BetaParams>,
    context_params: HashMap<String, HashMap<String, BetaParams>>,
    rng: ChaCha8Rng,
    prior_alpha: f64,
    prior_beta: f64,
    min_context_weight: f64,
    max_context_weight: f64,
    enable_soft_update: bool,
    update_count: i64,
}

impl ThompsonModel {
    pub fn new(options: ThompsonSamplingOptions) -> Self {
        Self {
            global_params: HashMap::new(),
            context_params: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(options.seed),
            prior_alpha: options.prior_alpha.max(EPSILON),
            prior_beta: options.prior_beta.max(EPSILON),
            min_context_weight: options.min_context_weight,
            max_context_weight: options.max_context_weight,
            enable_soft_update: options.enable_soft_update,
            update_count: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(ThompsonSamplingOptions {
            seed,
            ..Default::default()
        })
    }

    /// `Beta(a, b) = Gamma(a) / (Gamma(a) + Gamma(b))`.
    pub fn sample_beta(&mut self, alpha: f64, beta: f64) -> f64 {
        let a = alpha.max(EPSILON);
        let b = beta.max(EPSILON);

        let x = self.sample_gamma_internal(a, 1.0, 0);
        let y = self.sample_gamma_internal(b, 1.0, 0);

        let sum = x + y;
        if sum > 0.0 && sum.is_finite() {
            x / sum
        } else {
            0.5
        }
    }

    pub fn sample_gamma(&mut self, shape: f64, scale: f64) -> f64 {
        self.sample_gamma_internal(shape, scale, 0)
    }

    /// Marsaglia & Tsang (2000), "A simple method for generating gamma variables."
    fn sample_gamma_internal(&mut self, shape: f64, scale: f64, depth: usize) -> f64 {
        if shape <= 0.0 {
            return 0.0;
        }

        if depth >= MAX_GAMMA_RECURSION {
            return shape * scale;
        }

        if shape < 1.0 {
            let u: f64 = self.rng.gen();
            let u_safe = u.max(EPSILON);
            return self.sample_gamma_internal(1.0 + shape, scale, depth + 1) * u_safe.powf(1.0 / shape);
        }

        let d = shape - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();

        for _ in 0..MAX_GAMMA_ITERATIONS {
            let x = self.sample_normal();
            let v_term = 1.0 + c * x;

            if v_term <= 0.0 {
                continue;
            }

            let v = v_term.powi(3);
            let u: f64 = self.rng.gen();
            let x2 = x * x;
            let x4 = x2 * x2;

            if u < 1.0 - 0.0331 * x4 {
                return d * v * scale;
            }

            if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
                return d * v * scale;
            }
        }

        shape * scale
    }

    fn sample_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen::<f64>().max(EPSILON);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    pub fn batch_sample(&mut self, action_keys: &[String]) -> Vec<f64> {
        action_keys
            .iter()
            .map(|key| {
                let params = self.ensure_global_params(key);
                self.sample_beta(params.alpha, params.beta)
            })
            .collect()
    }

    pub fn select_action(&mut self, action_keys: &[String]) -> ActionSelection {
        if action_keys.is_empty() {
            return ActionSelection {
                action_key: String::new(),
                score: 0.0,
                confidence: 0.0,
                global_sample: 0.0,
                contextual_sample: 0.0,
            };
        }

        let mut best: Option<ActionSelection> = None;

        for action_key in action_keys {
            let params = self.ensure_global_params(action_key);
            let sample = self.sample_beta(params.alpha, params.beta);
            let confidence = self.compute_confidence(&params, &params);

            let selection = ActionSelection {
                action_key: action_key.clone(),
                score: sample,
                confidence,
                global_sample: sample,
                contextual_sample: sample,
            };

            if best.as_ref().is_none_or(|b| sample > b.score) {
                best = Some(selection);
            }
        }

        best.expect("non-empty action_keys yields a selection")
    }

    /// Blend the global and contextual samples by how much contextual data
    /// exists yet: scarce context data falls back to the global estimate.
    pub fn select_action_with_context(
        &mut self,
        context_key: &str,
        action_keys: &[String],
    ) -> ActionSelection {
        if action_keys.is_empty() {
            return ActionSelection {
                action_key: String::new(),
                score: 0.0,
                confidence: 0.0,
                global_sample: 0.0,
                contextual_sample: 0.0,
            };
        }

        let mut best: Option<ActionSelection> = None;

        for action_key in action_keys {
            let global_params = self.ensure_global_params(action_key);
            let contextual_params = self.ensure_context_params(action_key, context_key);

            let global_sample = self.sample_beta(global_params.alpha, global_params.beta);
            let contextual_sample = self.sample_beta(contextual_params.alpha, contextual_params.beta);

            let score = self.blend_samples(global_sample, contextual_sample, &global_params, &contextual_params);
            let confidence = self.compute_confidence(&global_params, &contextual_params);

            let selection = ActionSelection {
                action_key: action_key.clone(),
                score,
                confidence,
                global_sample,
                contextual_sample,
            };

            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(selection);
            }
        }

        best.expect("non-empty action_keys yields a selection")
    }

    pub fn update(&mut self, action_key: &str, success: bool) {
        let params = self
            .global_params
            .entry(action_key.to_string())
            .or_insert_with(|| BetaParams::new(self.prior_alpha, self.prior_beta));

        if success {
            params.alpha += 1.0;
        } else {
            params.beta += 1.0;
        }

        self.update_count += 1;
    }

    /// Binary mode: `reward >= 0` counts as success. Soft mode spreads the
    /// reward across alpha/beta instead of an all-or-nothing increment.
    pub fn update_with_reward(&mut self, action_key: &str, reward: f64) {
        let safe_reward = reward.clamp(-1.0, 1.0);

        let params = self
            .global_params
            .entry(action_key.to_string())
            .or_insert_with(|| BetaParams::new(self.prior_alpha, self.prior_beta));

        apply_reward(params, safe_reward, self.enable_soft_update);
        self.update_count += 1;
    }

    pub fn update_with_context(&mut self, context_key: &str, action_key: &str, success: bool) {
        self.update(action_key, success);

        let context_map = self.context_params.entry(action_key.to_string()).or_default();
        let params = context_map
            .entry(context_key.to_string())
            .or_insert_with(|| BetaParams::new(self.prior_alpha, self.prior_beta));

        if success {
            params.alpha += 1.0;
        } else {
            params.beta += 1.0;
        }
    }

    pub fn update_with_context_and_reward(&mut self, context_key: &str, action_key: &str, reward: f64) {
        let safe_reward = reward.clamp(-1.0, 1.0);
        self.update_with_reward(action_key, safe_reward);

        let context_map = self.context_params.entry(action_key.to_string()).or_default();
        let params = context_map
            .entry(context_key.to_string())
            .or_insert_with(|| BetaParams::new(self.prior_alpha, self.prior_beta));

        apply_reward(params, safe_reward, self.enable_soft_update);
    }

    pub fn get_expected_value(&self, action_key: &str) -> f64 {
        self.global_params
            .get(action_key)
            .map(|p| p.expected_value())
            .unwrap_or_else(|| self.prior_alpha / (self.prior_alpha + self.prior_beta))
    }

    pub fn get_expected_value_with_context(&self, context_key: &str, action_key: &str) -> f64 {
        self.context_params
            .get(action_key)
            .and_then(|m| m.get(context_key))
            .map(|p| p.expected_value())
            .unwrap_or_else(|| self.prior_alpha / (self.prior_alpha + self.prior_beta))
    }

    pub fn get_sample_count(&self, action_key: &str) -> f64 {
        self.global_params
            .get(action_key)
            .map(|p| (p.alpha + p.beta - self.prior_alpha - self.prior_beta).max(0.0))
            .unwrap_or(0.0)
    }

    pub fn get_global_params(&self, action_key: &str) -> Option<BetaParams> {
        self.global_params.get(action_key).cloned()
    }

    pub fn get_context_params(&self, action_key: &str, context_key: &str) -> Option<BetaParams> {
        self.context_params.get(action_key).and_then(|m| m.get(context_key)).cloned()
    }

    pub fn set_global_params(&mut self, action_key: &str, alpha: f64, beta: f64) {
        self.global_params.insert(action_key.to_string(), BetaParams::new(alpha, beta));
    }

    pub fn get_update_count(&self) -> i64 {
        self.update_count
    }

    pub fn reset(&mut self) {
        self.global_params.clear();
        self.context_params.clear();
        self.update_count = 0;
    }

    pub fn snapshot(&self) -> ThompsonSnapshot {
        ThompsonSnapshot {
            prior_alpha: self.prior_alpha,
            prior_beta: self.prior_beta,
            update_count: self.update_count,
            global_params: self.global_params.clone(),
            context_params: self.context_params.clone(),
        }
    }

    /// Restore a snapshot, re-anchoring old parameters to this model's prior
    /// so a changed prior doesn't retroactively distort past observations.
    pub fn restore(&mut self, snapshot: ThompsonSnapshot) {
        let alpha_delta = self.prior_alpha - snapshot.prior_alpha;
        let beta_delta = self.prior_beta - snapshot.prior_beta;

        self.global_params = snapshot
            .global_params
            .into_iter()
            .map(|(k, v)| (k, migrate_params(v, alpha_delta, beta_delta, self.prior_alpha, self.prior_beta)))
            .collect();

        self.context_params = snapshot
            .context_params
            .into_iter()
            .map(|(action_key, context_map)| {
                let migrated = context_map
                    .into_iter()
                    .map(|(ctx, v)| (ctx, migrate_params(v, alpha_delta, beta_delta, self.prior_alpha, self.prior_beta)))
                    .collect();
                (action_key, migrated)
            })
            .collect();

        self.update_count = snapshot.update_count.max(0);
    }

    fn ensure_global_params(&mut self, action_key: &str) -> BetaParams {
        self.global_params
            .entry(action_key.to_string())
            .or_insert_with(|| BetaParams::new(self.prior_alpha, self.prior_beta))
            .clone()
    }

    fn ensure_context_params(&mut self, action_key: &str, context_key: &str) -> BetaParams {
        let context_map = self.context_params.entry(action_key.to_string()).or_default();
        context_map
            .entry(context_key.to_string())
            .or_insert_with(|| BetaParams::new(self.prior_alpha, self.prior_beta))
            .clone()
    }

    fn blend_samples(
        &self,
        global_sample: f64,
        contextual_sample: f64,
        global_params: &BetaParams,
        contextual_params: &BetaParams,
    ) -> f64 {
        let prior_total = self.prior_alpha + self.prior_beta;
        let contextual_total = contextual_params.total();

        if contextual_total <= prior_total {
            return global_sample;
        }

        let global_total = global_params.total();
        let raw_weight = contextual_total / (contextual_total + global_total + 1.0);
        let weight = (self.min_context_weight + raw_weight * (self.max_context_weight - self.min_context_weight))
            .clamp(self.min_context_weight, self.max_context_weight);

        weight * contextual_sample + (1.0 - weight) * global_sample
    }

    fn compute_confidence(&self, global_params: &BetaParams, contextual_params: &BetaParams) -> f64 {
        let prior_total = self.prior_alpha + self.prior_beta;
        let global_observations = (global_params.total() - prior_total).max(0.0);
        let contextual_observations = (contextual_params.total() - prior_total).max(0.0);
        let effective_observations = global_observations.max(contextual_observations);

        (effective_observations / (effective_observations + CONFIDENCE_SCALE)).clamp(0.0, 1.0)
    }
}

fn apply_reward(params: &mut BetaParams, safe_reward: f64, soft: bool) {
    if soft {
        let normalized_reward = (safe_reward + 1.0) / 2.0;
        params.alpha += normalized_reward;
        params.beta += 1.0 - normalized_reward;
    } else if safe_reward >= 0.0 {
        params.alpha += 1.0;
    } else {
        params.beta += 1.0;
    }
}

fn migrate_params(v: BetaParams, alpha_delta: f64, beta_delta: f64, prior_alpha: f64, prior_beta: f64) -> BetaParams {
    BetaParams {
        alpha: (v.alpha + alpha_delta).max(prior_alpha),
        beta: (v.beta + beta_delta).max(prior_beta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_beta_stays_in_unit_interval() {
        let mut sampler = ThompsonModel::with_seed(42);
        for _ in 0..100 {
            let sample = sampler.sample_beta(1.0, 1.0);
            assert!((0.0..=1.0).contains(&sample));
        }
    }

    #[test]
    fn skewed_beta_parameters_skew_the_mean() {
        let mut sampler = ThompsonModel::with_seed(42);

        let high_alpha_mean: f64 = (0..100).map(|_| sampler.sample_beta(10.0, 1.0)).sum::<f64>() / 100.0;
        assert!(high_alpha_mean > 0.7);

        let high_beta_mean: f64 = (0..100).map(|_| sampler.sample_beta(1.0, 10.0)).sum::<f64>() / 100.0;
        assert!(high_beta_mean < 0.3);
    }

    #[test]
    fn gamma_samples_are_finite_and_nonnegative() {
        let mut sampler = ThompsonModel::with_seed(42);
        for &shape in &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0] {
            for _ in 0..50 {
                let sample = sampler.sample_gamma(shape, 1.0);
                assert!(sample >= 0.0 && sample.is_finite());
            }
        }
    }

    #[test]
    fn update_moves_expected_value() {
        let mut sampler = ThompsonModel::with_seed(42);

        assert!((sampler.get_expected_value("test") - 0.5).abs() < EPSILON);

        sampler.update("test", true);
        let after_success = sampler.get_expected_value("test");
        assert!(after_success > 0.5);

        sampler.update("test", false);
        sampler.update("test", false);
        assert!(sampler.get_expected_value("test") < after_success);
    }

    #[test]
    fn binary_reward_update_increments_alpha_or_beta() {
        let mut sampler = ThompsonModel::with_seed(42);

        sampler.update_with_reward("binary", 0.5);
        assert_eq!(sampler.get_global_params("binary").unwrap().alpha, 2.0);

        sampler.update_with_reward("binary", -0.5);
        assert_eq!(sampler.get_global_params("binary").unwrap().beta, 2.0);
    }

    #[test]
    fn soft_update_spreads_reward_across_alpha_and_beta() {
        let mut sampler = ThompsonModel::new(ThompsonSamplingOptions {
            enable_soft_update: true,
            seed: 42,
            ..Default::default()
        });

        sampler.update_with_reward("soft", 0.5);
        let params = sampler.get_global_params("soft").unwrap();
        assert!((params.alpha - 1.75).abs() < EPSILON);
        assert!((params.beta - 1.25).abs() < EPSILON);
    }

    #[test]
    fn best_arm_is_selected_most_often() {
        let mut sampler = ThompsonModel::with_seed(42);

        for _ in 0..10 {
            sampler.update("best", true);
            sampler.update("worst", false);
        }

        let best_count = (0..100)
            .filter(|_| sampler.select_action(&["best".to_string(), "worst".to_string()]).action_key == "best")
            .count();

        assert!(best_count > 70);
    }

    #[test]
    fn context_specific_updates_are_independent() {
        let mut sampler = ThompsonModel::with_seed(42);

        sampler.update_with_context("ctx1", "action1", true);
        sampler.update_with_context("ctx1", "action1", true);

        assert!(sampler.get_expected_value_with_context("ctx1", "action1") > 0.5);
        assert!((sampler.get_expected_value_with_context("ctx2", "action1") - 0.5).abs() < EPSILON);
    }

    #[test]
    fn snapshot_roundtrip_preserves_update_count_and_values() {
        let mut sampler1 = ThompsonModel::with_seed(42);
        sampler1.update("action1", true);
        sampler1.update("action1", true);
        sampler1.update_with_context("ctx", "action2", false);

        let snapshot = sampler1.snapshot();

        let mut sampler2 = ThompsonModel::with_seed(123);
        sampler2.restore(snapshot);

        assert_eq!(sampler1.get_update_count(), sampler2.get_update_count());
        assert!((sampler1.get_expected_value("action1") - sampler2.get_expected_value("action1")).abs() < EPSILON);
    }

    #[test]
    fn reset_clears_all_state() {
        let mut sampler = ThompsonModel::with_seed(42);
        sampler.update("test", true);
        sampler.update_with_context("ctx", "action", true);
        assert!(sampler.get_update_count() > 0);

        sampler.reset();

        assert_eq!(sampler.get_update_count(), 0);
        assert!(sampler.get_global_params("test").is_none());
        assert!((sampler.get_expected_value("test") - 0.5).abs() < EPSILON);
    }

    #[test]
    fn same_seed_reproduces_samples() {
        let mut sampler1 = ThompsonModel::with_seed(42);
        let mut sampler2 = ThompsonModel::with_seed(42);

        for _ in 0..10 {
            assert!((sampler1.sample_beta(2.0, 3.0) - sampler2.sample_beta(2.0, 3.0)).abs() < EPSILON);
        }
    }

    #[test]
    fn sample_count_excludes_prior() {
        let mut sampler = ThompsonModel::with_seed(42);
        assert_eq!(sampler.get_sample_count("test"), 0.0);

        sampler.update("test", true);
        sampler.update("test", false);
        assert_eq!(sampler.get_sample_count("test"), 2.0);
    }

    #[test]
    fn confidence_grows_with_observations() {
        let mut sampler = ThompsonModel::with_seed(42);

        let initial = sampler.select_action(&["test".to_string()]);
        assert!(initial.confidence < 0.1);

        for _ in 0..50 {
            sampler.update("test", true);
        }

        let later = sampler.select_action(&["test".to_string()]);
        assert!(later.confidence > 0.5);
    }

    #[test]
    fn empty_action_list_returns_empty_selection() {
        let mut sampler = ThompsonModel::with_seed(42);
        let selection = sampler.select_action(&[]);
        assert!(selection.action_key.is_empty());
    }

    #[test]
    fn extreme_beta_parameters_stay_bounded() {
        let mut sampler = ThompsonModel::with_seed(42);

        let small = sampler.sample_beta(0.001, 0.001);
        assert!((0.0..=1.0).contains(&small));

        let large = sampler.sample_beta(1000.0, 1000.0);
        assert!((large - 0.5).abs() < 0.1);
    }
}
