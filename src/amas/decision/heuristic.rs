use crate::amas::types::{DifficultyLevel, StrategyParams, UserState};

/// Deterministic fatigue-indexed fallback policy (§4.m). Used directly
/// when the ensemble has no healthy learner to consult, and as one of
/// the four per-action scorers inside the ensemble itself.
pub struct HeuristicLearner;

impl HeuristicLearner {
    pub fn new() -> Self {
        Self
    }

    fn stress(state: &UserState) -> f64 {
        0.5 * state.fatigue + 0.3 * (1.0 - state.attention) + 0.2 * (1.0 - (state.motivation + 1.0) / 2.0)
    }

    pub fn suggest(&self, state: &UserState) -> StrategyParams {
        let stress = Self::stress(state);

        if state.fatigue >= 0.8
            || state.motivation <= -0.7
            || (state.attention <= 0.25 && state.fatigue >= 0.65)
            || stress >= 0.7
        {
            return StrategyParams {
                batch_size: 5,
                difficulty: DifficultyLevel::Easy,
                hint_level: 2,
                interval_scale: 0.8,
                new_ratio: 0.1,
            };
        }

        if stress >= 0.4 || state.attention <= 0.25 {
            return StrategyParams {
                batch_size: 8,
                difficulty: DifficultyLevel::Mid,
                hint_level: 1,
                interval_scale: 1.0,
                new_ratio: 0.2,
            };
        }

        let difficulty = if state.cognitive.mem >= 0.75 {
            DifficultyLevel::Hard
        } else {
            DifficultyLevel::Mid
        };
        let new_ratio = if state.cognitive.mem >= 0.75 { 0.3 } else { 0.2 };

        StrategyParams {
            batch_size: 12,
            difficulty,
            hint_level: 0,
            interval_scale: 1.2,
            new_ratio,
        }
    }

    /// Score a candidate action by how close it is to the policy's
    /// prescribed action for this state — 1.0 for an exact match, decaying
    /// with each differing field. Used as the rule-based learner's vote
    /// in the ensemble (§4.h).
    pub fn score(&self, state: &UserState, candidate: &StrategyParams) -> f64 {
        let target = self.suggest(state);
        let mut score = 1.0;
        if candidate.difficulty != target.difficulty {
            score -= 0.3;
        }
        score -= (candidate.batch_size - target.batch_size).unsigned_abs() as f64 * 0.03;
        score -= (candidate.hint_level - target.hint_level).unsigned_abs() as f64 * 0.1;
        score -= (candidate.new_ratio - target.new_ratio).abs();
        score -= (candidate.interval_scale - target.interval_scale).abs() * 0.5;
        score.max(0.0)
    }
}

impl Default for HeuristicLearner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::CognitiveProfile;

    fn state(fatigue: f64, attention: f64, motivation: f64, mem: f64) -> UserState {
        UserState {
            attention,
            fatigue,
            cognitive: CognitiveProfile {
                mem,
                speed: 0.5,
                stability: 0.5,
            },
            motivation,
            conf: 0.5,
            ts: 0,
            cold_start: None,
            habit: None,
            trend: None,
        }
    }

    #[test]
    fn high_fatigue_triggers_conservative_strategy() {
        let s = HeuristicLearner::new().suggest(&state(0.85, 0.7, 0.0, 0.5));
        assert_eq!(s.batch_size, 5);
        assert_eq!(s.difficulty, DifficultyLevel::Easy);
        assert_eq!(s.hint_level, 2);
        assert!((s.interval_scale - 0.8).abs() < 1e-9);
        assert!((s.new_ratio - 0.1).abs() < 1e-9);
    }

    #[test]
    fn low_motivation_triggers_conservative_strategy() {
        let s = HeuristicLearner::new().suggest(&state(0.1, 0.7, -0.8, 0.5));
        assert_eq!(s.batch_size, 5);
    }

    #[test]
    fn moderate_stress_gives_balanced_strategy() {
        let s = HeuristicLearner::new().suggest(&state(0.5, 0.6, 0.0, 0.5));
        assert_eq!(s.batch_size, 8);
        assert_eq!(s.difficulty, DifficultyLevel::Mid);
    }

    #[test]
    fn low_stress_high_mastery_gives_hard_strategy() {
        let s = HeuristicLearner::new().suggest(&state(0.1, 0.9, 0.5, 0.8));
        assert_eq!(s.batch_size, 12);
        assert_eq!(s.difficulty, DifficultyLevel::Hard);
        assert!((s.new_ratio - 0.3).abs() < 1e-9);
    }

    #[test]
    fn low_stress_low_mastery_gives_mid_strategy() {
        let s = HeuristicLearner::new().suggest(&state(0.1, 0.9, 0.5, 0.4));
        assert_eq!(s.difficulty, DifficultyLevel::Mid);
        assert!((s.new_ratio - 0.2).abs() < 1e-9);
    }

    #[test]
    fn score_is_maximal_for_exact_match() {
        let st = state(0.1, 0.9, 0.5, 0.8);
        let h = HeuristicLearner::new();
        let target = h.suggest(&st);
        assert!((h.score(&st, &target) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_decreases_for_mismatched_candidate() {
        let st = state(0.1, 0.9, 0.5, 0.8);
        let h = HeuristicLearner::new();
        let bad = StrategyParams {
            batch_size: 5,
            difficulty: DifficultyLevel::Easy,
            hint_level: 2,
            interval_scale: 0.8,
            new_ratio: 0.1,
        };
        assert!(h.score(&st, &bad) < h.score(&st, &h.suggest(&st)));
    }
}
