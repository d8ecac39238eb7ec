#![allow(dead_code)]

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::db::state_machine::DatabaseState;
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct RequestDbState(pub DatabaseState);

pub async fn capture_request_db_state(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let selected = match state.db_state() {
        Some(db_state) => db_state.read().await.state(),
        None => DatabaseState::Normal,
    };

    req.extensions_mut().insert(RequestDbState(selected));
    next.run(req).await
}
