//! 22-dimensional context-vector builder (§4.a). Fixed, versioned slot
//! order; bias last. This is the one place that knows the layout — the
//! `native` LinUCB implementation only ever sees opaque `&[f64]`.

use chrono::{Timelike, Utc};

use crate::amas::types::{Action, FeatureVector, DifficultyLevel, FEATURE_VERSION, UserState};

pub const DIMENSION: usize = 22;

pub fn labels() -> Vec<String> {
    [
        "A", "F", "C.mem", "C.speed", "M", "1-recentAccuracy", "intervalScale", "newRatio",
        "difficulty", "hintLevel/3", "batchNorm", "rtNorm", "timeOfDay/24", "sin(2pi*t/24)",
        "cos(2pi*t/24)", "A*F", "M*F", "paceMatch", "C.mem*newRatio", "F*rtNorm", "newRatio*M",
        "bias",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Inputs beyond `UserState`/`Action` needed to fill the remaining slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureContext {
    pub recent_accuracy: f64,
    pub response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub rt_cv: f64,
    pub pace_cv: f64,
    pub hour_of_day: u32,
}

impl FeatureContext {
    pub fn now(mut self) -> Self {
        self.hour_of_day = Utc::now().hour();
        self
    }
}

fn rt_norm(ctx: &FeatureContext) -> f64 {
    if ctx.max_response_time_ms <= 0.0 {
        return 0.5;
    }
    (ctx.response_time_ms / ctx.max_response_time_ms).clamp(0.0, 1.0)
}

fn pace_match(ctx: &FeatureContext) -> f64 {
    (1.0 - (ctx.rt_cv - ctx.pace_cv).abs()).clamp(0.0, 1.0)
}

/// Builds the full context vector for `(state, action)` under `ctx`.
pub fn build(state: &UserState, action: &Action, ctx: &FeatureContext) -> Vec<f64> {
    let rt_norm = rt_norm(ctx);
    let pace_match = pace_match(ctx);
    let hour = (ctx.hour_of_day % 24) as f64;
    let angle = 2.0 * std::f64::consts::PI * hour / 24.0;

    let difficulty = action.difficulty.as_unit();
    let batch_norm = (action.batch_size as f64 / 20.0).clamp(0.0, 1.0);
    let hint_norm = (action.hint_level as f64 / 3.0).clamp(0.0, 1.0);

    vec![
        state.attention,
        state.fatigue,
        state.cognitive.mem,
        state.cognitive.speed,
        state.motivation,
        (1.0 - ctx.recent_accuracy).clamp(0.0, 1.0),
        action.interval_scale,
        action.new_ratio,
        difficulty,
        hint_norm,
        batch_norm,
        rt_norm,
        hour / 24.0,
        angle.sin(),
        angle.cos(),
        state.attention * state.fatigue,
        state.motivation * state.fatigue,
        pace_match,
        state.cognitive.mem * action.new_ratio,
        state.fatigue * rt_norm,
        action.new_ratio * state.motivation,
        1.0,
    ]
}

pub fn build_vector(state: &UserState, action: &Action, ctx: &FeatureContext) -> FeatureVector {
    FeatureVector::new(build(state, action, ctx), labels())
}

/// Swaps only the action-dependent slots (6,7,8,9) of an already-built
/// context vector, leaving the state-derived slots untouched. Used by the
/// ensemble to score many candidate actions against one state cheaply.
pub fn perturb(base: &[f64], action: &Action) -> Vec<f64> {
    let mut x = base.to_vec();
    if x.len() == DIMENSION {
        x[6] = action.interval_scale;
        x[7] = action.new_ratio;
        x[8] = action.difficulty.as_unit();
        x[9] = (action.hint_level as f64 / 3.0).clamp(0.0, 1.0);
        x[18] = x[2] * action.new_ratio;
        x[20] = action.new_ratio * x[4];
    }
    x
}

/// Aligns a stored context vector of a possibly-older dimension to the
/// current `DIMENSION`: zero-padded when shorter, truncated when longer.
/// Callers should log a single WARN when `stored_dim != DIMENSION`.
pub fn align_to_current(values: &[f64]) -> Vec<f64> {
    let mut aligned = values.to_vec();
    aligned.resize(DIMENSION, 0.0);
    aligned
}

pub fn current_version() -> u32 {
    FEATURE_VERSION
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

    #[test]
    fn builds_exactly_22_dimensions() {
        let v = build(&state(), &StrategyParams::default(), &FeatureContext::default());
        assert_eq!(v.len(), DIMENSION);
    }

    #[test]
    fn bias_slot_is_one() {
        let v = build(&state(), &StrategyParams::default(), &FeatureContext::default());
        assert_eq!(v[21], 1.0);
    }

    #[test]
    fn labels_match_dimension() {
        assert_eq!(labels().len(), DIMENSION);
    }

    #[test]
    fn perturb_changes_only_action_slots() {
        let ctx = FeatureContext::default();
        let base = build(&state(), &StrategyParams::default(), &ctx);
        let hard = StrategyParams {
            difficulty: DifficultyLevel::Hard,
            batch_size: 20,
            hint_level: 0,
            interval_scale: 1.5,
            new_ratio: 0.4,
        };
        let perturbed = perturb(&base, &hard);
        assert_eq!(perturbed[8], 1.0);
        assert_eq!(perturbed[0], base[0]);
        assert_eq!(perturbed[1], base[1]);
    }

    #[test]
    fn align_zero_pads_shorter_vectors() {
        let aligned = align_to_current(&[1.0, 2.0]);
        assert_eq!(aligned.len(), DIMENSION);
        assert_eq!(aligned[0], 1.0);
        assert_eq!(aligned[DIMENSION - 1], 0.0);
    }

    #[test]
    fn align_truncates_longer_vectors() {
        let long = vec![1.0; DIMENSION + 5];
        let aligned = align_to_current(&long);
        assert_eq!(aligned.len(), DIMENSION);
    }

    #[test]
    fn round_trips_through_serialisation() {
        let fv = build_vector(&state(), &StrategyParams::default(), &FeatureContext::default());
        let json = serde_json::to_string(&fv).unwrap();
        let back: FeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back.values, fv.values);
        assert_eq!(back.version, FEATURE_VERSION);
    }
}
