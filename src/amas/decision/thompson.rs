//! Thin wrapper around `amas_native::ThompsonModel`: each candidate
//! `Action` is keyed by a stable string signature, context keyed by the
//! fatigue/attention bucket it falls into.

use amas_native::{ThompsonModel, ThompsonSamplingOptions, ThompsonSnapshot};

use crate::amas::types::{Action, UserState};

pub struct ThompsonLearner {
    model: ThompsonModel,
}

pub struct ThompsonChoice {
    pub action: Action,
    pub score: f64,
    pub confidence: f64,
}

fn action_key(action: &Action) -> String {
    format!(
        "{}:{}:{}",
        action.difficulty.as_str(),
        action.batch_size,
        action.hint_level,
    )
}

/// Coarse 3x3 attention/fatigue bucket used as the Thompson context key
/// (§4.h only requires a context-aware posterior, not a specific binning).
fn context_key(state: &UserState) -> String {
    fn bucket(v: f64) -> &'static str {
        if v < 0.33 {
            "lo"
        } else if v < 0.66 {
            "mid"
        } else {
            "hi"
        }
    }
    format!("a={}:f={}", bucket(state.attention), bucket(state.fatigue))
}

impl ThompsonLearner {
    pub fn new(seed: u64) -> Self {
        Self {
            model: ThompsonModel::with_seed(seed),
        }
    }

    pub fn from_snapshot(options: ThompsonSamplingOptions, snapshot: ThompsonSnapshot) -> Self {
        let mut model = ThompsonModel::new(options);
        model.restore(snapshot);
        Self { model }
    }

    pub fn snapshot(&self) -> ThompsonSnapshot {
        self.model.snapshot()
    }

    pub fn select(&mut self, state: &UserState, candidates: &[Action]) -> Option<ThompsonChoice> {
        if candidates.is_empty() {
            return None;
        }
        let ctx = context_key(state);
        let keys: Vec<String> = candidates.iter().map(action_key).collect();
        let selection = self.model.select_action_with_context(&ctx, &keys);
        let index = keys.iter().position(|k| k == &selection.action_key)?;
        Some(ThompsonChoice {
            action: candidates[index].clone(),
            score: selection.score,
            confidence: selection.confidence,
        })
    }

    pub fn update(&mut self, state: &UserState, action: &Action, reward: f64) {
        let ctx = context_key(state);
        let key = action_key(action);
        self.model.update_with_context_and_reward(&ctx, &key, reward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::{CognitiveProfile, DifficultyLevel, StrategyParams};

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
                difficulty: DifficultyLevel::Easy,
                ..StrategyParams::default()
            },
            StrategyParams {
                difficulty: DifficultyLevel::Hard,
                ..StrategyParams::default()
            },
        ]
    }

    #[test]
    fn select_returns_none_for_empty_candidates() {
        let mut learner = ThompsonLearner::new(42);
        assert!(learner.select(&state(), &[]).is_none());
    }

    #[test]
    fn select_returns_one_of_the_candidates() {
        let mut learner = ThompsonLearner::new(42);
        let cands = candidates();
        let choice = learner.select(&state(), &cands).unwrap();
        assert!(cands
            .iter()
            .any(|c| c.difficulty == choice.action.difficulty));
    }

    #[test]
    fn update_then_select_prefers_rewarded_action() {
        let mut learner = ThompsonLearner::new(7);
        let st = state();
        let cands = candidates();
        for _ in 0..50 {
            learner.update(&st, &cands[0], 1.0);
            learner.update(&st, &cands[1], -1.0);
        }
        let mut easy_wins = 0;
        for _ in 0..20 {
            if let Some(choice) = learner.select(&st, &cands) {
                if choice.action.difficulty == DifficultyLevel::Easy {
                    easy_wins += 1;
                }
            }
        }
        assert!(easy_wins > 10);
    }

    #[test]
    fn snapshot_roundtrips() {
        let mut learner = ThompsonLearner::new(1);
        let st = state();
        learner.update(&st, &candidates()[0], 1.0);
        let snap = learner.snapshot();
        let restored = ThompsonLearner::from_snapshot(ThompsonSamplingOptions::default(), snap.clone());
        assert_eq!(restored.snapshot().update_count, snap.update_count);
    }
}
