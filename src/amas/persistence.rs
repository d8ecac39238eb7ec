//! Persistence manager (§4.k): maps the in-memory `UserState` /
//! `ColdStartState` / `StrategyParams` triad onto the `amas_user_state`
//! and `amas_user_model` tables in `db::operations::amas`.

use std::sync::Arc;

use amas_native::BanditModel;

use crate::amas::error::AmasError;
use crate::amas::types::{
    ColdStartState, CognitiveProfile, HabitProfile, HabitSamples, PersistedAmasState,
    RhythmPreference, StrategyParams, TrendState, UserState,
};
use crate::db::operations::amas::{
    get_amas_user_model, get_amas_user_state, insert_amas_user_model, upsert_amas_user_state,
    AmasUserModel, AmasUserState,
};
use crate::db::DatabaseProxy;

pub struct AMASPersistence {
    db_proxy: Arc<DatabaseProxy>,
}

impl AMASPersistence {
    pub fn new(db_proxy: Arc<DatabaseProxy>) -> Self {
        Self { db_proxy }
    }

    pub async fn load_state(&self, user_id: &str) -> Result<Option<PersistedAmasState>, AmasError> {
        let Some(row) = get_amas_user_state(&self.db_proxy, user_id).await? else {
            return Ok(None);
        };

        let mut user_state = row_to_user_state(&row);
        user_state.habit = self.load_habit_profile(user_id).await;

        let cold_start_state = get_amas_user_model(&self.db_proxy, user_id, "coldstart")
            .await?
            .and_then(|m| serde_json::from_value(m.parameters).ok());

        let current_strategy = get_amas_user_model(&self.db_proxy, user_id, "strategy")
            .await?
            .and_then(|m| serde_json::from_value::<StrategyParams>(m.parameters).ok())
            .unwrap_or_default();

        let interaction_count = get_amas_user_model(&self.db_proxy, user_id, "interaction_count")
            .await?
            .and_then(|m| m.parameters.get("count").and_then(|v| v.as_i64()))
            .unwrap_or(0) as i32;

        let last_updated = chrono::DateTime::parse_from_rfc3339(&row.updated_at)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|e| {
                tracing::warn!(
                    user_id = %user_id,
                    updated_at = %row.updated_at,
                    error = %e,
                    "failed to parse updatedAt timestamp, falling back to now"
                );
                chrono::Utc::now().timestamp_millis()
            });

        Ok(Some(PersistedAmasState {
            user_id: user_id.to_string(),
            user_state,
            cold_start_state,
            current_strategy,
            interaction_count,
            last_updated,
        }))
    }

    pub async fn load_bandit_model(&self, user_id: &str) -> Result<Option<BanditModel>, AmasError> {
        let model = get_amas_user_model(&self.db_proxy, user_id, "bandit").await?;
        Ok(model.and_then(|m| serde_json::from_value(m.parameters).ok()))
    }

    pub async fn save_bandit_model(&self, user_id: &str, model: &BanditModel) -> Result<(), AmasError> {
        let now = chrono::Utc::now().to_rfc3339();
        let row = AmasUserModel {
            id: format!("{user_id}:bandit"),
            user_id: user_id.to_string(),
            model_type: "bandit".to_string(),
            parameters: serde_json::to_value(model).unwrap_or_default(),
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        };
        insert_amas_user_model(&self.db_proxy, &row).await?;
        Ok(())
    }

    async fn load_habit_profile(&self, user_id: &str) -> Option<HabitProfile> {
        use sqlx::Row;

        let pool = self.db_proxy.pool();
        let row = sqlx::query(
            r#"SELECT "timePref", "rhythmPref" FROM "habit_profiles" WHERE "userId" = $1 LIMIT 1"#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()?;

        let time_pref: Option<serde_json::Value> = row.try_get("timePref").ok().flatten();
        let rhythm_pref: Option<serde_json::Value> = row.try_get("rhythmPref").ok().flatten();

        let time_pref = time_pref
            .and_then(|v| v.as_array().cloned())
            .map(|arr| arr.iter().filter_map(|v| v.as_f64()).collect::<Vec<_>>())
            .filter(|v| v.len() == 24)
            .unwrap_or_else(|| vec![0.0; 24]);

        let rhythm = rhythm_pref
            .and_then(|v| v.as_object().cloned())
            .map(|obj| RhythmPreference {
                session_median_minutes: obj
                    .get("sessionMedianMinutes")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(15.0),
                batch_median: obj
                    .get("batchMedian")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(8.0),
            })
            .unwrap_or_default();

        let preferred_time_slots = compute_preferred_slots(&time_pref);

        Some(HabitProfile {
            time_pref,
            rhythm_pref: rhythm,
            preferred_time_slots,
            samples: HabitSamples::default(),
        })
    }

    pub async fn save_state(&self, state: &PersistedAmasState) -> Result<(), AmasError> {
        let row = user_state_to_row(&state.user_id, &state.user_state);
        upsert_amas_user_state(&self.db_proxy, &row).await?;

        if let Some(ref cold_start) = state.cold_start_state {
            self.save_model(&state.user_id, "coldstart", cold_start).await?;
        }

        self.save_strategy_snapshot(&state.user_id, &state.current_strategy).await?;
        self.save_model(
            &state.user_id,
            "interaction_count",
            &serde_json::json!({ "count": state.interaction_count }),
        )
        .await?;

        Ok(())
    }

    async fn save_strategy_snapshot(
        &self,
        user_id: &str,
        strategy: &StrategyParams,
    ) -> Result<(), AmasError> {
        let new_parameters = serde_json::to_value(strategy).unwrap_or_default();
        let previous = get_amas_user_model(&self.db_proxy, user_id, "strategy").await?;

        if let Some(ref previous) = previous {
            if previous.parameters == new_parameters {
                return Ok(());
            }
        }

        let next_version = previous
            .as_ref()
            .map(|m| m.version.max(0).saturating_add(1))
            .unwrap_or(1);

        let now = chrono::Utc::now().to_rfc3339();
        let model = AmasUserModel {
            id: format!("{user_id}:strategy:{next_version}"),
            user_id: user_id.to_string(),
            model_type: "strategy".to_string(),
            parameters: new_parameters,
            version: next_version,
            created_at: now.clone(),
            updated_at: now,
        };
        insert_amas_user_model(&self.db_proxy, &model).await?;
        Ok(())
    }

    async fn save_model(
        &self,
        user_id: &str,
        model_type: &str,
        value: &impl serde::Serialize,
    ) -> Result<(), AmasError> {
        let now = chrono::Utc::now().to_rfc3339();
        let model = AmasUserModel {
            id: format!("{user_id}:{model_type}"),
            user_id: user_id.to_string(),
            model_type: model_type.to_string(),
            parameters: serde_json::to_value(value).unwrap_or_default(),
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        };
        insert_amas_user_model(&self.db_proxy, &model).await?;
        Ok(())
    }
}

fn row_to_user_state(row: &AmasUserState) -> UserState {
    let cognitive = row
        .cognitive_profile
        .as_object()
        .map(|obj| CognitiveProfile {
            mem: obj.get("mem").and_then(|v| v.as_f64()).unwrap_or(0.5),
            speed: obj.get("speed").and_then(|v| v.as_f64()).unwrap_or(0.5),
            stability: obj.get("stability").and_then(|v| v.as_f64()).unwrap_or(0.5),
        })
        .unwrap_or_default();

    let trend = row
        .trend_state
        .as_ref()
        .and_then(|s| serde_json::from_str::<TrendState>(s).ok());

    UserState {
        attention: row.attention,
        fatigue: row.fatigue,
        cognitive,
        motivation: row.motivation,
        conf: row.confidence,
        ts: chrono::DateTime::parse_from_rfc3339(&row.updated_at)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|_| chrono::Utc::now().timestamp_millis()),
        cold_start: None,
        habit: None,
        trend,
    }
}

fn user_state_to_row(user_id: &str, state: &UserState) -> AmasUserState {
    let cognitive_profile = serde_json::json!({
        "mem": state.cognitive.mem,
        "speed": state.cognitive.speed,
        "stability": state.cognitive.stability,
    });

    let now = chrono::Utc::now().to_rfc3339();

    AmasUserState {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        attention: state.attention,
        fatigue: state.fatigue,
        motivation: state.motivation,
        cognitive_profile,
        trend_state: state
            .trend
            .as_ref()
            .and_then(|t| serde_json::to_string(t).ok()),
        confidence: state.conf,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn compute_preferred_slots(time_pref: &[f64]) -> Vec<i32> {
    let mut indexed: Vec<(usize, f64)> = time_pref.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.into_iter().take(3).map(|(hour, _)| hour as i32).collect()
}
