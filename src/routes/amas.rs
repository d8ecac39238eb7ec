use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::amas::types::{
    AlgorithmStatus, AmasProcessResult, LearningEventInput, ProcessOptions, StateOverrides,
    StrategyParams, UserType,
};
use crate::db::DatabaseProxy;
use crate::response::{json_error, AppError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

fn require_db(state: &AppState) -> Result<Arc<DatabaseProxy>, AppError> {
    state
        .db_proxy()
        .ok_or_else(|| json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_event))
        .route("/reward", post(enqueue_reward))
        .route("/explain-decision", get(explain_decision))
        .route("/learning-curve", get(learning_curve))
        .route("/counterfactual", post(counterfactual))
        .route("/algorithms/status", get(algorithms_status))
        .route("/cold-start-override", post(cold_start_override))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessEventBody {
    user_id: String,
    event: LearningEventInput,
    #[serde(default)]
    options: ProcessOptions,
}

async fn process_event(
    State(state): State<AppState>,
    Json(body): Json<ProcessEventBody>,
) -> Result<Json<SuccessResponse<AmasProcessResult>>, AppError> {
    let result = state
        .amas_engine()
        .process_event(&body.user_id, body.event, body.options)
        .await?;
    Ok(Json(SuccessResponse { success: true, data: result }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueRewardBody {
    user_id: String,
    reward: f64,
    answer_record_id: Option<String>,
    /// Milliseconds since epoch. Defaults to "due now", which the worker
    /// in `crate::workers` picks up on its next sweep.
    scheduled_for: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueRewardResponse {
    id: uuid::Uuid,
}

async fn enqueue_reward(
    State(state): State<AppState>,
    Json(body): Json<EnqueueRewardBody>,
) -> Result<Json<SuccessResponse<EnqueueRewardResponse>>, AppError> {
    if !(-1.0..=1.0).contains(&body.reward) {
        return Err(AppError::validation("reward must be within [-1, 1]"));
    }
    let proxy = require_db(&state)?;

    let due_ts = match body.scheduled_for {
        Some(ms) => chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now),
        None => chrono::Utc::now(),
    };
    let id = uuid::Uuid::new_v4();

    crate::db::operations::amas::insert_reward_queue_item(
        &proxy,
        id,
        &body.user_id,
        body.reward,
        due_ts,
        body.answer_record_id.as_deref(),
    )
    .await
    .map_err(|_| json_error(StatusCode::BAD_GATEWAY, "DB_ERROR", "奖励入队失败"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: EnqueueRewardResponse { id },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionIdQuery {
    decision_id: String,
}

async fn explain_decision(
    State(state): State<AppState>,
    Query(query): Query<DecisionIdQuery>,
) -> Result<Json<SuccessResponse<Option<crate::amas::types::DecisionExplanation>>>, AppError> {
    let explanation = state.amas_engine().explain_decision(&query.decision_id).await?;
    Ok(Json(SuccessResponse { success: true, data: explanation }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningCurveQuery {
    user_id: String,
    #[serde(default)]
    days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LearningCurvePoint {
    date: String,
    attempts: i64,
    correct: i64,
    accuracy: f64,
}

async fn learning_curve(
    State(state): State<AppState>,
    Query(query): Query<LearningCurveQuery>,
) -> Result<Json<SuccessResponse<Vec<LearningCurvePoint>>>, AppError> {
    let days = query.days.unwrap_or(30).clamp(7, 90);
    let proxy = require_db(&state)?;
    let since = chrono::Utc::now() - chrono::Duration::days(days);

    let points = crate::db::operations::amas::get_daily_accuracy(&proxy, &query.user_id, since)
        .await
        .map_err(|_| json_error(StatusCode::BAD_GATEWAY, "DB_ERROR", "数据库查询失败"))?
        .into_iter()
        .map(|p| LearningCurvePoint {
            date: p.day.to_string(),
            attempts: p.attempts,
            correct: p.correct,
            accuracy: if p.attempts > 0 {
                p.correct as f64 / p.attempts as f64
            } else {
                0.0
            },
        })
        .collect();

    Ok(Json(SuccessResponse { success: true, data: points }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CounterfactualBody {
    user_id: String,
    #[serde(default)]
    overrides: StateOverrides,
    current_params: Option<StrategyParams>,
}

async fn counterfactual(
    State(state): State<AppState>,
    Json(body): Json<CounterfactualBody>,
) -> Result<Json<SuccessResponse<AmasProcessResult>>, AppError> {
    let result = state
        .amas_engine()
        .counterfactual(&body.user_id, body.overrides, body.current_params)
        .await?;
    Ok(Json(SuccessResponse { success: true, data: result }))
}

async fn algorithms_status(State(state): State<AppState>) -> Json<SuccessResponse<Vec<AlgorithmStatus>>> {
    let statuses = state.amas_engine().algorithm_status().await;
    Json(SuccessResponse { success: true, data: statuses })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColdStartOverrideBody {
    user_id: String,
    user_type: UserType,
}

async fn cold_start_override(
    State(state): State<AppState>,
    Json(body): Json<ColdStartOverrideBody>,
) -> Result<Json<SuccessResponse<StrategyParams>>, AppError> {
    let strategy = state
        .amas_engine()
        .cold_start_override(&body.user_id, body.user_type)
        .await?;
    Ok(Json(SuccessResponse { success: true, data: strategy }))
}
