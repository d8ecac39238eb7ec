//! Visual fatigue intake: sample validation (§4.c), dynamic fusion-weight
//! calculation (§4.e) and per-user threshold learning (§4.f).

use std::collections::HashMap;

use crate::amas::config::VisualConfig;
use crate::amas::types::{
    FusionWeights, MeanStd, PersonalisedThresholds, ProcessedVisualSample, VisualFatigueSample,
};

/// Validates and normalises a raw visual fatigue sample into a form the
/// fusion engine can consume. Samples with out-of-range values, stale
/// timestamps or confidence below the configured floor are rejected by
/// marking `is_valid = false` rather than erroring, since a missing or
/// untrustworthy visual reading degrades to behavior-only fusion.
pub struct VisualFatigueProcessor {
    config: VisualConfig,
}

impl VisualFatigueProcessor {
    pub fn new(config: VisualConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, sample: &VisualFatigueSample, now_ms: i64) -> ProcessedVisualSample {
        let age_ms = (now_ms - sample.timestamp).max(0) as f64;
        let freshness = (1.0 - age_ms / self.config.freshness_window_ms as f64).clamp(0.0, 1.0);

        let score = self.clip_outlier(sample.score);
        let has_valid_range = score.is_finite()
            && (0.0..=1.0).contains(&score)
            && sample.confidence.is_finite()
            && (0.0..=1.0).contains(&sample.confidence);

        let is_valid =
            has_valid_range && sample.confidence >= self.config.min_confidence && freshness > 0.0;

        ProcessedVisualSample {
            score,
            confidence: sample.confidence.clamp(0.0, 1.0),
            is_valid,
            freshness,
        }
    }

    fn clip_outlier(&self, score: f64) -> f64 {
        if !score.is_finite() {
            return self.config.outlier_clip_low;
        }
        score.clamp(self.config.outlier_clip_low, self.config.outlier_clip_high)
    }
}

impl Default for VisualFatigueProcessor {
    fn default() -> Self {
        Self::new(VisualConfig::default())
    }
}

/// Computes the fusion weights to apply to a given visual reading,
/// boosting or discounting the visual channel by how trustworthy the
/// sample is and by the reported capture scene.
pub struct DynamicWeightCalculator {
    config: VisualConfig,
    base: FusionWeights,
}

impl DynamicWeightCalculator {
    pub fn new(config: VisualConfig, base: FusionWeights) -> Self {
        Self { config, base }
    }

    /// `trustworthiness` blends sample confidence and freshness; `scene`
    /// applies a configured boost/penalty (e.g. low light, occlusion).
    pub fn compute(&self, processed: &ProcessedVisualSample, scene: Option<&str>) -> FusionWeights {
        if !processed.is_valid {
            return FusionWeights {
                behavior: self.base.behavior + self.base.visual,
                visual: 0.0,
                temporal: self.base.temporal,
            };
        }

        let trust = (processed.confidence * processed.freshness).clamp(0.0, 1.0);
        let scene_boost = scene.map(|s| self.config.scene_boost(s)).unwrap_or(0.0);
        let adjusted_visual = (self.base.visual * trust + scene_boost).clamp(0.0, 1.0);

        let reclaimed = self.base.visual - adjusted_visual;
        let weights = FusionWeights {
            behavior: self.base.behavior + reclaimed.max(0.0),
            visual: adjusted_visual,
            temporal: self.base.temporal,
        };

        renormalize(weights)
    }
}

fn renormalize(weights: FusionWeights) -> FusionWeights {
    let total = weights.behavior + weights.visual + weights.temporal;
    if total <= 0.0 {
        return FusionWeights::default();
    }
    FusionWeights {
        behavior: weights.behavior / total,
        visual: weights.visual / total,
        temporal: weights.temporal / total,
    }
}

/// Learns per-user PERCLOS / blink-rate / fatigue-score baselines with a
/// Bayesian running mean/std update, so later fusion can compare a
/// reading against what's normal for that specific user rather than a
/// population default.
pub struct ThresholdLearner {
    config: VisualConfig,
    thresholds: HashMap<String, PersonalisedThresholds>,
}

impl ThresholdLearner {
    pub fn new(config: VisualConfig) -> Self {
        Self {
            config,
            thresholds: HashMap::new(),
        }
    }

    pub fn get(&self, user_id: &str) -> PersonalisedThresholds {
        self.thresholds
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn observe(&mut self, user_id: &str, sample: &VisualFatigueSample) -> PersonalisedThresholds {
        let mut current = self
            .thresholds
            .remove(user_id)
            .unwrap_or_default();

        current.perclos = self.update_mean_std(current.perclos, current.sample_count, sample.perclos);
        current.blink_rate =
            self.update_mean_std(current.blink_rate, current.sample_count, sample.blink_rate);
        current.fatigue_score =
            self.update_mean_std(current.fatigue_score, current.sample_count, sample.score);
        current.sample_count += 1;
        current.updated_at = chrono::Utc::now().timestamp_millis();

        self.thresholds.insert(user_id.to_string(), current.clone());
        current
    }

    /// Bayesian update of a running mean/std: the prior acts as
    /// `threshold_prior_samples` pseudo-observations, so early updates move
    /// the estimate slowly and it converges as real samples accumulate.
    fn update_mean_std(&self, prior: MeanStd, sample_count: i32, observation: f64) -> MeanStd {
        let n = self.config.threshold_prior_samples + sample_count as f64;
        let learning_rate = (1.0 / (n + 1.0)).max(self.config.threshold_learning_rate);

        let new_mean = prior.mean + learning_rate * (observation - prior.mean);
        let deviation = (observation - prior.mean).abs();
        let new_std = prior.std + learning_rate * (deviation - prior.std);

        MeanStd::new(new_mean, new_std.max(1e-3))
    }

    pub fn is_abnormal(&self, user_id: &str, sample: &VisualFatigueSample) -> bool {
        let thresholds = self.get(user_id);
        let z_score = (sample.score - thresholds.fatigue_score.mean).abs()
            / thresholds.fatigue_score.std.max(1e-3);
        z_score > 2.5
    }
}

impl Default for ThresholdLearner {
    fn default() -> Self {
        Self::new(VisualConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(score: f64, confidence: f64, timestamp: i64) -> VisualFatigueSample {
        VisualFatigueSample {
            score,
            perclos: 0.15,
            blink_rate: 14.0,
            confidence,
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_low_confidence_sample() {
        let processor = VisualFatigueProcessor::default();
        let processed = processor.process(&sample(0.5, 0.1, 0), 0);
        assert!(!processed.is_valid);
    }

    #[test]
    fn rejects_stale_sample() {
        let processor = VisualFatigueProcessor::default();
        let processed = processor.process(&sample(0.5, 0.9, 0), 60_000);
        assert_eq!(processed.freshness, 0.0);
        assert!(!processed.is_valid);
    }

    #[test]
    fn clips_out_of_range_score() {
        let processor = VisualFatigueProcessor::default();
        let processed = processor.process(&sample(1.8, 0.9, 0), 0);
        assert_eq!(processed.score, 1.0);
    }

    #[test]
    fn invalid_sample_zeroes_visual_weight() {
        let calculator = DynamicWeightCalculator::new(VisualConfig::default(), FusionWeights::default());
        let processed = ProcessedVisualSample {
            score: 0.5,
            confidence: 0.0,
            is_valid: false,
            freshness: 0.0,
        };
        let weights = calculator.compute(&processed, None);
        assert_eq!(weights.visual, 0.0);
    }

    #[test]
    fn trusted_sample_keeps_visual_weight_near_base() {
        let calculator = DynamicWeightCalculator::new(VisualConfig::default(), FusionWeights::default());
        let processed = ProcessedVisualSample {
            score: 0.5,
            confidence: 0.95,
            is_valid: true,
            freshness: 0.95,
        };
        let weights = calculator.compute(&processed, None);
        assert!(weights.visual > 0.2);
        assert!((weights.behavior + weights.visual + weights.temporal - 1.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_learner_converges_toward_observations() {
        let mut learner = ThresholdLearner::default();
        let mut last = learner.get("u1").fatigue_score.mean;
        for _ in 0..50 {
            let t = learner.observe("u1", &sample(0.8, 0.9, 0));
            last = t.fatigue_score.mean;
        }
        assert!(last > 0.3);
    }
}
