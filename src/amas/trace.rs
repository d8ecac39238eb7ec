//! Decision trace / explainability recorder (§4.l). Wraps the raw
//! `db::operations::amas` decision tables with a narrower API shaped
//! around "record what the ensemble just decided" and "explain the last
//! N decisions for a session".

use std::sync::Arc;

use chrono::Utc;

use crate::amas::decision::EnsembleOutput;
use crate::amas::error::AmasError;
use crate::amas::feature::current_version;
use crate::amas::types::{Action, DecisionExplanation, DecisionFactor};
use crate::db::operations::amas as db_amas;
use crate::db::DatabaseProxy;

pub struct TraceRecorder {
    db: Option<Arc<DatabaseProxy>>,
}

impl TraceRecorder {
    pub fn new(db: Option<Arc<DatabaseProxy>>) -> Self {
        Self { db }
    }

    pub async fn record_decision(
        &self,
        decision_id: &str,
        session_id: Option<&str>,
        answer_record_id: Option<&str>,
        action: &Action,
        output: &EnsembleOutput,
        decision_duration_ms: Option<i32>,
    ) -> Result<(), AmasError> {
        let Some(db) = self.db.as_ref() else {
            return Ok(());
        };

        let member_votes = serde_json::to_value(&output.per_learner_scores)
            .unwrap_or(serde_json::Value::Null);

        let record = db_amas::DecisionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            decision_id: decision_id.to_string(),
            answer_record_id: answer_record_id.map(str::to_string),
            session_id: session_id.map(str::to_string),
            decision_source: "ensemble".to_string(),
            coldstart_phase: None,
            weights_snapshot: None,
            member_votes: Some(member_votes),
            selected_action: serde_json::to_value(action).unwrap_or(serde_json::Value::Null),
            confidence: output.confidence,
            reward: None,
            trace_version: current_version() as i32,
            total_duration_ms: decision_duration_ms,
            is_simulation: false,
            emotion_label: None,
            flow_score: None,
        };

        db_amas::insert_decision_record(db, &record).await?;
        Ok(())
    }

    pub async fn record_insight(
        &self,
        decision_id: &str,
        user_id: &str,
        state_snapshot: &serde_json::Value,
        difficulty_factors: &serde_json::Value,
        triggers: &[String],
        feature_vector_hash: &str,
    ) -> Result<(), AmasError> {
        let Some(db) = self.db.as_ref() else {
            return Ok(());
        };

        db_amas::insert_decision_insight(
            db,
            decision_id,
            user_id,
            state_snapshot,
            difficulty_factors,
            triggers,
            feature_vector_hash,
        )
        .await?;
        Ok(())
    }

    pub async fn record_stage(
        &self,
        decision_record_id: &str,
        stage: &str,
        stage_name: &str,
        status: &str,
        started_at: chrono::NaiveDateTime,
        duration_ms: Option<i32>,
        error_message: Option<&str>,
    ) -> Result<(), AmasError> {
        let Some(db) = self.db.as_ref() else {
            return Ok(());
        };

        db_amas::insert_pipeline_stage(
            db,
            decision_record_id,
            stage,
            stage_name,
            status,
            started_at,
            Some(Utc::now().naive_utc()),
            duration_ms,
            None,
            None,
            None,
            error_message,
        )
        .await?;
        Ok(())
    }

    /// Builds a human-readable explanation of the last decision recorded
    /// for `session_id`, used by the `/explain-decision` endpoint.
    pub async fn explain_last_decision(
        &self,
        session_id: &str,
    ) -> Result<Option<DecisionExplanation>, AmasError> {
        let Some(db) = self.db.as_ref() else {
            return Ok(None);
        };

        let records = db_amas::get_recent_decision_records(db, session_id, 1).await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };

        let factors = record
            .member_votes
            .as_ref()
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .map(|(name, scores)| DecisionFactor {
                        name: name.clone(),
                        value: scores
                            .as_array()
                            .and_then(|a| a.first())
                            .and_then(|v| v.as_f64())
                            .unwrap_or(0.0),
                        impact: "contributed".to_string(),
                        percentage: 0.0,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(DecisionExplanation {
            factors,
            changes: Vec::new(),
            text: format!(
                "decision {} selected via {} with confidence {:.2}",
                record.decision_id, record.decision_source, record.confidence
            ),
        }))
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new(None)
    }
}
