//! Thin wrapper around `amas_native::LinUcbModel`: builds the
//! action-perturbed context vector for each candidate via `amas::feature`
//! and scores it with the Cholesky-backed ridge regression in the
//! accelerator crate.

use amas_native::LinUcbModel;

use crate::amas::feature;
use crate::amas::types::{Action, UserState};

pub struct LinUcbLearner {
    model: LinUcbModel,
}

pub struct LinUcbChoice {
    pub action: Action,
    pub score: f64,
    pub confidence: f64,
}

impl LinUcbLearner {
    pub fn new(alpha: f64) -> Self {
        Self {
            model: LinUcbModel::new(feature::DIMENSION, Some(1.0), Some(alpha)),
        }
    }

    pub fn from_model(model: amas_native::BanditModel) -> Self {
        Self {
            model: LinUcbModel::from_model(model),
        }
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.model.set_alpha(alpha);
    }

    pub fn model(&self) -> &amas_native::BanditModel {
        self.model.model()
    }

    pub fn into_model(self) -> amas_native::BanditModel {
        self.model.into_model()
    }

    pub fn is_healthy(&self) -> bool {
        self.model.is_healthy()
    }

    /// Scores every candidate action by perturbing `base_context` (the
    /// context vector built for the user's current action) with each
    /// candidate's own parameters, per §4.h's "action -> feature
    /// perturbation on x".
    pub fn select(
        &self,
        _state: &UserState,
        base_context: &[f64],
        candidates: &[Action],
    ) -> Option<LinUcbChoice> {
        if candidates.is_empty() {
            return None;
        }
        let vectors: Vec<Vec<f64>> = candidates
            .iter()
            .map(|a| feature::perturb(base_context, a))
            .collect();
        let best = self.model.select_best(&vectors)?;
        Some(LinUcbChoice {
            action: candidates[best.index].clone(),
            score: best.score,
            confidence: best.confidence,
        })
    }

    pub fn score_all(&self, base_context: &[f64], candidates: &[Action]) -> Vec<f64> {
        candidates
            .iter()
            .map(|a| {
                let x = feature::perturb(base_context, a);
                self.model.score(&x).score
            })
            .collect()
    }

    pub fn update(&mut self, x: &[f64], reward: f64) {
        self.model.update(x, reward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::{CognitiveProfile, StrategyParams};

    fn state() -> UserState {
        UserState {
            attention: 0.7,
            fatigue: 0.2,
            cognitive: CognitiveProfile {
                mem: 0.6,
                speed: 0.5,
                stability: 0.5,
            },
            motivation: 0.1,
            conf: 0.5,
            ts: 0,
            cold_start: None,
            habit: None,
            trend: None,
        }
    }

    fn candidates() -> Vec<StrategyParams> {
        vec![
            StrategyParams {
                difficulty: crate::amas::types::DifficultyLevel::Easy,
                ..StrategyParams::default()
            },
            StrategyParams {
                difficulty: crate::amas::types::DifficultyLevel::Hard,
                ..StrategyParams::default()
            },
        ]
    }

    #[test]
    fn select_returns_none_for_empty_candidates() {
        let learner = LinUcbLearner::new(0.3);
        let ctx = feature::build(
            &state(),
            &StrategyParams::default(),
            &feature::FeatureContext::default(),
        );
        assert!(learner.select(&state(), &ctx, &[]).is_none());
    }

    #[test]
    fn select_returns_one_of_the_candidates() {
        let learner = LinUcbLearner::new(0.3);
        let st = state();
        let ctx = feature::build(&st, &StrategyParams::default(), &feature::FeatureContext::default());
        let cands = candidates();
        let choice = learner.select(&st, &ctx, &cands).unwrap();
        assert!(cands.iter().any(|c| c.batch_size == choice.action.batch_size
            && c.difficulty == choice.action.difficulty));
    }

    #[test]
    fn update_changes_subsequent_scores() {
        let mut learner = LinUcbLearner::new(0.3);
        let st = state();
        let ctx = feature::build(&st, &StrategyParams::default(), &feature::FeatureContext::default());
        let before = learner.score_all(&ctx, &candidates());
        learner.update(&ctx, 1.0);
        let after = learner.score_all(&ctx, &candidates());
        assert_ne!(before, after);
    }
}
