use std::collections::HashMap;

use crate::amas::types::{DominantSource, FatigueLevel, FusionResult, FusionWeights};

const CONFLICT_THRESHOLD: f64 = 0.4;
const CONFIDENCE_THRESHOLD: f64 = 0.2;
const TEMPORAL_DECAY_K: f64 = 0.05;
const TEMPORAL_THRESHOLD_MIN: f64 = 30.0;

/// Process and observation noise for the per-user fatigue Kalman filter.
/// Tuned loose: the filter exists to damp frame-to-frame jitter in the
/// fused signal, not to model a tight dynamical system.
const PROCESS_NOISE_Q: f64 = 0.01;
const OBSERVATION_NOISE_R: f64 = 0.05;

struct KalmanState {
    x: f64,
    p: f64,
}

impl KalmanState {
    fn new(initial: f64) -> Self {
        Self { x: initial, p: 1.0 }
    }

    fn update(&mut self, z: f64) -> f64 {
        let predicted_p = self.p + PROCESS_NOISE_Q;
        let k = predicted_p / (predicted_p + OBSERVATION_NOISE_R);
        self.x += k * (z - self.x);
        self.p = (1.0 - k) * predicted_p;
        self.x
    }
}

/// Fuses behavioral, visual and temporal fatigue signals into a single
/// score per user, smoothed with a scalar Kalman filter to damp
/// frame-to-frame jitter in the visual channel.
pub struct FatigueFusionEngine {
    weights: FusionWeights,
    filters: HashMap<String, KalmanState>,
}

impl FatigueFusionEngine {
    pub fn new(weights: FusionWeights) -> Self {
        Self {
            weights,
            filters: HashMap::new(),
        }
    }

    pub fn fuse(
        &mut self,
        user_id: &str,
        behavior_fatigue: f64,
        visual_fatigue: Option<f64>,
        visual_confidence: Option<f64>,
        study_duration_min: f64,
    ) -> FusionResult {
        let behavior_fatigue = behavior_fatigue.clamp(0.0, 1.0);
        let temporal_fatigue = temporal_fatigue(study_duration_min);

        let has_visual = matches!(visual_fatigue, Some(_))
            && visual_confidence.unwrap_or(0.0) >= CONFIDENCE_THRESHOLD;

        let (visual_component, weights) = if has_visual {
            (visual_fatigue.unwrap().clamp(0.0, 1.0), self.weights.clone())
        } else {
            // No trustworthy visual sample: redistribute its weight onto
            // behavior and fall back to a two-source fusion.
            (
                0.0,
                FusionWeights {
                    behavior: self.weights.behavior + self.weights.visual,
                    visual: 0.0,
                    temporal: self.weights.temporal,
                },
            )
        };

        let raw_fused = weights.behavior * behavior_fatigue
            + weights.visual * visual_component
            + weights.temporal * temporal_fatigue;

        let filter = self
            .filters
            .entry(user_id.to_string())
            .or_insert_with(|| KalmanState::new(raw_fused));
        let fused_fatigue = filter.update(raw_fused.clamp(0.0, 1.0)).clamp(0.0, 1.0);

        let (has_conflict, conflict_description) = if has_visual {
            let gap = (behavior_fatigue - visual_component).abs();
            if gap > CONFLICT_THRESHOLD {
                (
                    true,
                    Some(format!(
                        "behavioral fatigue ({behavior_fatigue:.2}) and visual fatigue ({visual_component:.2}) diverge by {gap:.2}"
                    )),
                )
            } else {
                (false, None)
            }
        } else {
            (false, None)
        };

        let dominant_source = dominant_source(
            weights.behavior * behavior_fatigue,
            weights.visual * visual_component,
            weights.temporal * temporal_fatigue,
        );

        let fatigue_level = FatigueLevel::from_score(fused_fatigue);
        let recommendations = recommendations_for(fatigue_level, has_conflict);

        FusionResult {
            fused_fatigue,
            behavior_fatigue,
            visual_fatigue: visual_component,
            temporal_fatigue,
            weights,
            dominant_source,
            has_conflict,
            conflict_description,
            fatigue_level,
            recommendations,
        }
    }

    pub fn reset_user(&mut self, user_id: &str) {
        self.filters.remove(user_id);
    }
}

impl Default for FatigueFusionEngine {
    fn default() -> Self {
        Self::new(FusionWeights::default())
    }
}

fn temporal_fatigue(duration_minutes: f64) -> f64 {
    let effective = (duration_minutes - TEMPORAL_THRESHOLD_MIN).max(0.0);
    1.0 - (-TEMPORAL_DECAY_K * effective).exp()
}

fn dominant_source(behavior_weighted: f64, visual_weighted: f64, temporal_weighted: f64) -> DominantSource {
    if behavior_weighted >= visual_weighted && behavior_weighted >= temporal_weighted {
        DominantSource::Behavior
    } else if visual_weighted >= temporal_weighted {
        DominantSource::Visual
    } else {
        DominantSource::Temporal
    }
}

fn recommendations_for(level: FatigueLevel, has_conflict: bool) -> Vec<String> {
    let mut recs = match level {
        FatigueLevel::Alert => vec!["维持当前学习节奏".to_string()],
        FatigueLevel::Mild => vec!["建议在接下来的学习中适当放慢节奏".to_string()],
        FatigueLevel::Moderate => vec!["建议休息 5-10 分钟后再继续学习".to_string()],
        FatigueLevel::Severe => vec!["建议立即停止学习并休息".to_string()],
    };

    if has_conflict {
        recs.push("行为信号与视觉信号存在分歧，建议结合实际情况判断".to_string());
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuses_without_visual_redistributes_weight() {
        let mut engine = FatigueFusionEngine::default();
        let result = engine.fuse("u1", 0.2, None, None, 0.0);
        assert_eq!(result.weights.visual, 0.0);
        assert!(!result.has_conflict);
    }

    #[test]
    fn detects_conflict_between_behavior_and_visual() {
        let mut engine = FatigueFusionEngine::default();
        let result = engine.fuse("u1", 0.1, Some(0.9), Some(0.8), 0.0);
        assert!(result.has_conflict);
        assert!(result.conflict_description.is_some());
    }

    #[test]
    fn low_confidence_visual_sample_is_ignored() {
        let mut engine = FatigueFusionEngine::default();
        let result = engine.fuse("u1", 0.1, Some(0.9), Some(0.05), 0.0);
        assert_eq!(result.weights.visual, 0.0);
    }

    #[test]
    fn kalman_filter_smooths_successive_updates() {
        let mut engine = FatigueFusionEngine::default();
        let first = engine.fuse("u1", 0.9, None, None, 0.0).fused_fatigue;
        let second = engine.fuse("u1", 0.1, None, None, 0.0).fused_fatigue;
        assert!(second > 0.1);
        assert!(second < first);
    }

    #[test]
    fn severe_fatigue_recommends_stopping() {
        let mut engine = FatigueFusionEngine::default();
        let result = engine.fuse("u1", 0.95, None, None, 120.0);
        assert_eq!(result.fatigue_level, FatigueLevel::Severe);
        assert!(result.recommendations.iter().any(|r| r.contains('停')));
    }

    #[test]
    fn temporal_fatigue_grows_with_study_duration() {
        assert_eq!(temporal_fatigue(10.0), 0.0);
        assert!(temporal_fatigue(90.0) > temporal_fatigue(45.0));
    }
}
