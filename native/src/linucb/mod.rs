//! LinUCB contextual bandit: Cholesky-backed ridge regression with an
//! upper-confidence-bound exploration term.
//!
//! This module only does the linear algebra — `A = X^T X + λI`, `b = X^T y`,
//! `θ = A^{-1} b`, `score = θ^T x + α·sqrt(x^T A^{-1} x)` — over an opaque
//! context vector. Building that vector from a user/action pair is the
//! caller's job (see `amas::feature` in the main crate); keeping the two
//! separate means this crate never needs to know the feature layout.

use crate::matrix::*;
use crate::sanitize::*;
use crate::types::*;

pub struct UcbStats {
    pub theta: Vec<f64>,
    pub exploitation: f64,
    pub confidence: f64,
    pub score: f64,
}

pub struct BestSelection {
    pub index: usize,
    pub exploitation: f64,
    pub confidence: f64,
    pub score: f64,
    pub all_scores: Vec<f64>,
}

pub struct LinUcbModel {
    model: BanditModel,
}

impl LinUcbModel {
    pub fn new(d: usize, lambda: Option<f64>, alpha: Option<f64>) -> Self {
        let lambda = lambda.unwrap_or(1.0).max(MIN_LAMBDA);
        let alpha = alpha.unwrap_or(0.3);
        Self {
            model: BanditModel::new(d, lambda, alpha),
        }
    }

    pub fn from_model(model: BanditModel) -> Self {
        Self { model }
    }

    pub fn dimension(&self) -> usize {
        self.model.d as usize
    }

    pub fn alpha(&self) -> f64 {
        self.model.alpha
    }

    pub fn set_alpha(&mut self, value: f64) {
        self.model.alpha = value.max(0.0);
    }

    pub fn update_count(&self) -> u32 {
        self.model.update_count
    }

    /// `θ = A^{-1} b`, `exploitation = θ^T x`, `confidence = sqrt(x^T A^{-1} x)`.
    pub fn score(&self, x: &[f64]) -> UcbStats {
        let d = self.dimension();
        let theta = solve_cholesky(&self.model.l_matrix, &self.model.b, d);
        let exploitation = dot_product(&theta, x);
        let confidence = compute_quadratic_form(&self.model.l_matrix, x, d).sqrt();
        let score = exploitation + self.model.alpha * confidence;

        UcbStats {
            theta,
            exploitation,
            confidence,
            score,
        }
    }

    /// Score every candidate context vector and return the best, or `None`
    /// if `candidates` is empty.
    pub fn select_best(&self, candidates: &[Vec<f64>]) -> Option<BestSelection> {
        if candidates.is_empty() {
            return None;
        }

        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_exploitation = 0.0;
        let mut best_confidence = 0.0;
        let mut all_scores = Vec::with_capacity(candidates.len());

        for (idx, x) in candidates.iter().enumerate() {
            let mut x = x.clone();
            sanitize_feature_vector(&mut x);

            let stats = self.score(&x);
            all_scores.push(stats.score);

            if stats.score > best_score {
                best_score = stats.score;
                best_idx = idx;
                best_exploitation = stats.exploitation;
                best_confidence = stats.confidence;
            }
        }

        Some(BestSelection {
            index: best_idx,
            exploitation: best_exploitation,
            confidence: best_confidence,
            score: best_score,
            all_scores,
        })
    }

    /// `A += x x^T`, `b += r x`, then either a rank-1 Cholesky update or a
    /// full recompute when the factor has drifted.
    pub fn update(&mut self, x: &[f64], reward: f64) {
        let d = self.dimension();
        if x.len() != d {
            return;
        }

        let mut x = x.to_vec();
        sanitize_feature_vector(&mut x);

        let need_recompute = needs_full_recompute(self.model.update_count, &self.model.l_matrix, d);

        rank1_update_matrix(&mut self.model.a_matrix, &x, d);
        vec_add_scaled(&mut self.model.b, &x, reward);

        if need_recompute {
            sanitize_covariance(&mut self.model.a_matrix, d, self.model.lambda);
            self.model.l_matrix = cholesky_decompose(&self.model.a_matrix, d, self.model.lambda);
        } else {
            let success =
                cholesky_rank1_update(&mut self.model.l_matrix, &x, d, MIN_RANK1_DIAG);
            if !success {
                sanitize_covariance(&mut self.model.a_matrix, d, self.model.lambda);
                self.model.l_matrix = cholesky_decompose(&self.model.a_matrix, d, self.model.lambda);
            }
        }

        self.model.update_count += 1;
    }

    pub fn diagnose(&self) -> DiagnosticResult {
        diagnose_model(&self.model.a_matrix, &self.model.l_matrix, self.dimension())
    }

    pub fn is_healthy(&self) -> bool {
        self.diagnose().is_healthy
    }

    pub fn model(&self) -> &BanditModel {
        &self.model
    }

    pub fn into_model(self) -> BanditModel {
        self.model
    }

    pub fn set_model(&mut self, model: BanditModel) {
        if model.d == self.model.d {
            self.model = model;
        }
    }

    pub fn reset(&mut self) {
        let d = self.dimension();
        self.model = BanditModel::new(d, self.model.lambda, self.model.alpha);
    }
}

/// Scale exploration by how little is known about a user: fewer interactions,
/// an unstable accuracy rate, or high fatigue all push `alpha` up (fatigue
/// pushes it back down, favoring safer exploitation when the user is tired).
pub fn get_cold_start_alpha(interaction_count: u32, recent_accuracy: f64, fatigue: f64) -> f64 {
    let base_alpha = 0.3;

    let interaction_factor = if interaction_count < 10 {
        2.0
    } else if interaction_count < 50 {
        1.5
    } else if interaction_count < 200 {
        1.2
    } else {
        1.0
    };

    let accuracy_factor = if !(0.3..=0.9).contains(&recent_accuracy) {
        1.3
    } else {
        1.0
    };

    let fatigue_factor = 1.0 - fatigue * 0.3;

    base_alpha * interaction_factor * accuracy_factor * fatigue_factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(seed: f64, d: usize) -> Vec<f64> {
        (0..d).map(|i| seed + i as f64 * 0.01).collect()
    }

    #[test]
    fn select_best_on_empty_candidates_returns_none() {
        let model = LinUcbModel::new(FEATURE_DIMENSION, None, None);
        assert!(model.select_best(&[]).is_none());
    }

    #[test]
    fn select_best_picks_higher_scoring_candidate() {
        let mut model = LinUcbModel::new(4, Some(1.0), Some(0.1));
        let good = vec![1.0, 0.0, 0.0, 0.0];
        let bad = vec![0.0, 0.0, 0.0, 1.0];

        model.update(&good, 1.0);
        model.update(&good, 1.0);
        model.update(&bad, -1.0);
        model.update(&bad, -1.0);

        let selection = model.select_best(&[bad.clone(), good.clone()]).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.all_scores.len(), 2);
    }

    #[test]
    fn select_best_single_candidate() {
        let model = LinUcbModel::new(4, None, None);
        let selection = model.select_best(&[candidate(0.1, 4)]).unwrap();
        assert_eq!(selection.index, 0);
        assert_eq!(selection.all_scores.len(), 1);
    }

    #[test]
    fn update_with_mismatched_dimension_is_a_noop() {
        let mut model = LinUcbModel::new(4, None, None);
        let before = model.update_count();
        model.update(&[1.0, 2.0], 1.0);
        assert_eq!(model.update_count(), before);
    }

    #[test]
    fn update_increments_count_and_stays_healthy() {
        let mut model = LinUcbModel::new(FEATURE_DIMENSION, None, None);
        for i in 0..20 {
            let x = candidate(i as f64 * 0.05, FEATURE_DIMENSION);
            model.update(&x, if i % 2 == 0 { 1.0 } else { 0.0 });
        }
        assert_eq!(model.update_count(), 20);
        assert!(model.is_healthy());
    }

    #[test]
    fn reset_clears_update_count_but_keeps_hyperparameters() {
        let mut model = LinUcbModel::new(4, Some(2.0), Some(0.5));
        model.update(&[1.0, 0.0, 0.0, 0.0], 1.0);
        model.reset();
        assert_eq!(model.update_count(), 0);
        assert_eq!(model.alpha(), 0.5);
    }

    #[test]
    fn set_model_rejects_dimension_mismatch() {
        let mut model = LinUcbModel::new(4, None, None);
        let wrong = BanditModel::new(5, 1.0, 0.3);
        model.set_model(wrong);
        assert_eq!(model.dimension(), 4);
    }

    #[test]
    fn cold_start_alpha_decreases_with_more_interactions() {
        let few = get_cold_start_alpha(5, 0.6, 0.0);
        let many = get_cold_start_alpha(500, 0.6, 0.0);
        assert!(few > many);
    }

    #[test]
    fn cold_start_alpha_increases_for_unstable_accuracy() {
        let stable = get_cold_start_alpha(100, 0.6, 0.0);
        let unstable = get_cold_start_alpha(100, 0.95, 0.0);
        assert!(unstable > stable);
    }

    #[test]
    fn cold_start_alpha_decreases_with_fatigue() {
        let rested = get_cold_start_alpha(100, 0.6, 0.0);
        let tired = get_cold_start_alpha(100, 0.6, 1.0);
        assert!(tired < rested);
    }
}
