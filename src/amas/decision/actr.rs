//! ACT-R memory-model scorer for the ensemble (§4.h). Scores a candidate
//! action by how close the recall probability at the action's proposed
//! review interval lands to a target retention of 0.85 — the action that
//! schedules review neither too early (wasted review) nor too late (the
//! word is forgotten) wins.

use amas_native::{ActrModel, MemoryTrace};

use crate::amas::types::Action;

const TARGET_RETENTION: f64 = 0.85;
const BASE_INTERVAL_SECONDS: f64 = 24.0 * 3600.0;

pub struct ActrLearner {
    model: ActrModel,
}

pub struct ActrChoice {
    pub index: usize,
    pub score: f64,
}

impl ActrLearner {
    pub fn new(decay: f64, threshold: f64, noise_scale: f64) -> Self {
        Self {
            model: ActrModel::new(Some(decay), Some(threshold), Some(noise_scale)),
        }
    }

    pub fn from_cognitive_profile(mem: f64, speed: f64, stability: f64, threshold: f64, noise_scale: f64) -> Self {
        let mut model = ActrModel::new(None, Some(threshold), Some(noise_scale));
        let decay = model.compute_personalized_decay(mem, speed, stability);
        model.set_decay(decay);
        Self { model }
    }

    /// Predicted recall probability `interval_scale` days out from now: each
    /// trace's `timestamp` (seconds-ago) ages forward by the proposed
    /// review horizon before activation is recomputed.
    fn predicted_recall(&self, traces: &[MemoryTrace], action: &Action) -> f64 {
        if traces.is_empty() {
            return 0.5;
        }
        let horizon = BASE_INTERVAL_SECONDS * action.interval_scale.max(0.1);
        let aged: Vec<MemoryTrace> = traces
            .iter()
            .map(|t| MemoryTrace {
                timestamp: t.timestamp + horizon,
                is_correct: t.is_correct,
            })
            .collect();
        let activation = self.model.compute_activation(&aged);
        self.model.compute_recall_probability(activation)
    }

    pub fn score(&self, traces: &[MemoryTrace], action: &Action) -> f64 {
        let recall = self.predicted_recall(traces, action);
        (1.0 - (recall - TARGET_RETENTION).abs()).clamp(0.0, 1.0)
    }

    pub fn select(&self, traces: &[MemoryTrace], candidates: &[Action]) -> Option<ActrChoice> {
        if candidates.is_empty() {
            return None;
        }
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, action) in candidates.iter().enumerate() {
            let s = self.score(traces, action);
            if s > best_score {
                best_score = s;
                best_idx = i;
            }
        }
        Some(ActrChoice {
            index: best_idx,
            score: best_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::StrategyParams;

    fn traces() -> Vec<MemoryTrace> {
        vec![
            MemoryTrace {
                timestamp: 3600.0,
                is_correct: true,
            },
            MemoryTrace {
                timestamp: 7200.0,
                is_correct: true,
            },
        ]
    }

    #[test]
    fn score_is_bounded() {
        let learner = ActrLearner::new(0.5, 0.3, 0.0);
        let score = learner.score(&traces(), &StrategyParams::default());
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn empty_traces_fall_back_to_neutral_recall() {
        let learner = ActrLearner::new(0.5, 0.3, 0.0);
        let score = learner.score(&[], &StrategyParams::default());
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn select_picks_a_candidate() {
        let learner = ActrLearner::new(0.5, 0.3, 0.0);
        let candidates = vec![
            StrategyParams {
                interval_scale: 0.5,
                ..StrategyParams::default()
            },
            StrategyParams {
                interval_scale: 2.0,
                ..StrategyParams::default()
            },
        ];
        let choice = learner.select(&traces(), &candidates).unwrap();
        assert!(choice.index < candidates.len());
    }
}
