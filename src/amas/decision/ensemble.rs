//! Decision ensemble (§4.h): combines four per-action scorers —
//! Thompson sampling, LinUCB, the ACT-R memory model, and the rule-based
//! fallback — into a single weighted vote over a bounded action set.

use std::collections::HashMap;

use amas_native::MemoryTrace;

use crate::amas::types::{Action, StrategyParams, UserState};

use super::actr::ActrLearner;
use super::heuristic::HeuristicLearner;
use super::linucb::LinUcbLearner;
use super::thompson::ThompsonLearner;

#[derive(Debug, Clone, Copy)]
pub struct EnsembleWeights {
    pub thompson: f64,
    pub linucb: f64,
    pub actr: f64,
    pub rule: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            thompson: 0.5,
            linucb: 0.25,
            actr: 0.15,
            rule: 0.10,
        }
    }
}

pub struct EnsembleOutput {
    pub action: Action,
    pub confidence: f64,
    pub per_learner_scores: HashMap<String, Vec<f64>>,
    pub skipped: Vec<String>,
}

pub struct EnsembleDecision {
    weights: EnsembleWeights,
    heuristic: HeuristicLearner,
}

impl EnsembleDecision {
    pub fn new(weights: EnsembleWeights) -> Self {
        Self {
            weights,
            heuristic: HeuristicLearner::new(),
        }
    }

    /// Runs all four learners over `candidates` and combines their votes.
    /// Any learner that cannot produce scores (e.g. LinUCB/Thompson given
    /// an empty candidate set) is skipped with an implicit score of 0 and
    /// named in `skipped`; if every learner is skipped the rule-based
    /// policy's own suggestion is returned directly.
    pub fn decide(
        &self,
        state: &UserState,
        traces: &[MemoryTrace],
        base_context: &[f64],
        candidates: &[Action],
        linucb: &LinUcbLearner,
        thompson: &mut ThompsonLearner,
        actr: &ActrLearner,
    ) -> EnsembleOutput {
        if candidates.is_empty() {
            return EnsembleOutput {
                action: self.heuristic.suggest(state),
                confidence: 0.0,
                per_learner_scores: HashMap::new(),
                skipped: vec!["all".to_string()],
            };
        }

        let n = candidates.len();
        let mut per_learner_scores = HashMap::new();
        let mut skipped = Vec::new();
        let mut combined = vec![0.0; n];

        let linucb_scores = linucb.score_all(base_context, candidates);
        if linucb_scores.iter().any(|v| v.is_finite()) {
            add_weighted(&mut combined, &normalize(&linucb_scores), self.weights.linucb);
            per_learner_scores.insert("linucb".to_string(), linucb_scores);
        } else {
            skipped.push("linucb".to_string());
        }

        let thompson_scores = thompson_score_all(thompson, state, candidates);
        add_weighted(&mut combined, &normalize(&thompson_scores), self.weights.thompson);
        per_learner_scores.insert("thompson".to_string(), thompson_scores);

        let actr_scores: Vec<f64> = candidates.iter().map(|a| actr.score(traces, a)).collect();
        add_weighted(&mut combined, &normalize(&actr_scores), self.weights.actr);
        per_learner_scores.insert("actr".to_string(), actr_scores);

        let rule_scores: Vec<f64> = candidates.iter().map(|a| self.heuristic.score(state, a)).collect();
        add_weighted(&mut combined, &normalize(&rule_scores), self.weights.rule);
        per_learner_scores.insert("rule".to_string(), rule_scores);

        let selected = select_best(&combined, candidates);
        let confidence = softmax(&combined)[selected];

        EnsembleOutput {
            action: candidates[selected].clone(),
            confidence,
            per_learner_scores,
            skipped,
        }
    }

    pub fn fallback(&self, state: &UserState) -> StrategyParams {
        self.heuristic.suggest(state)
    }
}

impl Default for EnsembleDecision {
    fn default() -> Self {
        Self::new(EnsembleWeights::default())
    }
}

fn thompson_score_all(thompson: &mut ThompsonLearner, state: &UserState, candidates: &[Action]) -> Vec<f64> {
    candidates
        .iter()
        .map(|a| thompson.select(state, std::slice::from_ref(a)).map(|c| c.score).unwrap_or(0.0))
        .collect()
}

fn normalize(scores: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = scores.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return vec![0.0; scores.len()];
    }
    let min = finite.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    scores
        .iter()
        .map(|&v| {
            if !v.is_finite() || range < 1e-9 {
                0.5
            } else {
                (v - min) / range
            }
        })
        .collect()
}

fn add_weighted(combined: &mut [f64], scores: &[f64], weight: f64) {
    for (c, s) in combined.iter_mut().zip(scores.iter()) {
        *c += weight * s;
    }
}

/// Picks the max-scoring candidate; ties broken by smaller `batch_size`.
fn select_best(scores: &[f64], candidates: &[Action]) -> usize {
    let mut best = 0;
    for i in 1..scores.len() {
        if scores[i] > scores[best] + 1e-12
            || (scores[i] > scores[best] - 1e-12 && candidates[i].batch_size < candidates[best].batch_size)
        {
            best = i;
        }
    }
    best
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    if sum < 1e-12 {
        vec![1.0 / scores.len() as f64; scores.len()]
    } else {
        exp.iter().map(|e| e / sum).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::feature;
    use crate::amas::types::{CognitiveProfile, DifficultyLevel};

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

    fn candidates() -> Vec<Action> {
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
    fn empty_candidates_fall_back_to_rule_based() {
        let ensemble = EnsembleDecision::default();
        let mut thompson = ThompsonLearner::new(1);
        let linucb = LinUcbLearner::new(0.3);
        let actr = ActrLearner::new(0.5, 0.3, 0.0);
        let out = ensemble.decide(&state(), &[], &[], &[], &linucb, &mut thompson, &actr);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.skipped, vec!["all".to_string()]);
    }

    #[test]
    fn decide_picks_a_candidate_and_reports_scores() {
        let ensemble = EnsembleDecision::default();
        let mut thompson = ThompsonLearner::new(1);
        let linucb = LinUcbLearner::new(0.3);
        let actr = ActrLearner::new(0.5, 0.3, 0.0);
        let st = state();
        let ctx = feature::build(&st, &StrategyParams::default(), &feature::FeatureContext::default());
        let cands = candidates();
        let out = ensemble.decide(&st, &[], &ctx, &cands, &linucb, &mut thompson, &actr);
        assert!(cands.iter().any(|c| c.difficulty == out.action.difficulty));
        assert!(out.confidence > 0.0);
        assert_eq!(out.per_learner_scores.len(), 4);
    }

    #[test]
    fn softmax_sums_to_one() {
        let s = softmax(&[1.0, 2.0, 3.0]);
        let sum: f64 = s.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tie_break_prefers_smaller_batch_size() {
        let scores = [1.0, 1.0];
        let cands = vec![
            StrategyParams {
                batch_size: 12,
                ..StrategyParams::default()
            },
            StrategyParams {
                batch_size: 5,
                ..StrategyParams::default()
            },
        ];
        assert_eq!(select_best(&scores, &cands), 1);
    }
}
