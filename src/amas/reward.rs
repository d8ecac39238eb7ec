//! Delayed-reward application (§4.j). The worker in `crate::workers`
//! owns claiming and scheduling queue rows; this module owns applying a
//! claimed reward to the bandit model once it's due.

use tracing::warn;

use crate::amas::decision::LinUcbLearner;
use crate::amas::error::AmasError;
use crate::amas::feature::{self, DIMENSION};
use crate::amas::types::RewardQueueItem;

/// Applies a single reward to `learner`, realigning the stored context
/// vector to the current feature dimension first. A stored vector from an
/// older `FEATURE_VERSION` is zero-padded/truncated rather than rejected,
/// since the bandit model tolerates a partially-stale context far better
/// than it tolerates losing the reward signal entirely.
pub fn apply_reward(
    learner: &mut LinUcbLearner,
    item: &RewardQueueItem,
    stored_context: &[f64],
) -> Result<(), AmasError> {
    if stored_context.is_empty() {
        return Err(AmasError::InsufficientData(format!(
            "reward {} has no stored context to apply against",
            item.id
        )));
    }

    let context = if stored_context.len() != DIMENSION {
        warn!(
            reward_id = %item.id,
            stored_dim = stored_context.len(),
            current_dim = DIMENSION,
            "realigning stale reward context to current feature dimension"
        );
        feature::align_to_current(stored_context)
    } else {
        stored_context.to_vec()
    };

    learner.update(&context, item.reward);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_item(reward: f64) -> RewardQueueItem {
        RewardQueueItem {
            id: uuid::Uuid::new_v4(),
            user_id: "u1".to_string(),
            reward,
            scheduled_for: Utc::now().timestamp_millis(),
            session_id: None,
            answer_record_id: None,
            attempts: 0,
            status: crate::amas::types::RewardStatus::Pending,
        }
    }

    #[test]
    fn rejects_empty_context() {
        let mut learner = LinUcbLearner::new(0.3);
        let err = apply_reward(&mut learner, &sample_item(0.5), &[]).unwrap_err();
        assert!(matches!(err, AmasError::InsufficientData(_)));
    }

    #[test]
    fn realigns_short_context_before_updating() {
        let mut learner = LinUcbLearner::new(0.3);
        let short_context = vec![0.5; DIMENSION - 4];
        apply_reward(&mut learner, &sample_item(0.8), &short_context).unwrap();
    }

    #[test]
    fn applies_full_dimension_context_directly() {
        let mut learner = LinUcbLearner::new(0.3);
        let context = vec![0.2; DIMENSION];
        apply_reward(&mut learner, &sample_item(-0.3), &context).unwrap();
    }
}
