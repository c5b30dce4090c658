//! The endpoint agents poll. Check-ins and result submissions share it.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;

use super::method_not_allowed;
use crate::error::{AppError, Result};
use crate::schemas::{AgentReply, CheckinRequest};
use crate::state::AppState;

/// Create agent routes
pub fn agent_routes(state: AppState) -> Router {
    Router::new()
        .route("/checkin", post(checkin).fallback(method_not_allowed))
        .with_state(state)
}

async fn checkin(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckinRequest>, JsonRejection>,
) -> Result<Json<AgentReply>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let reply = state.checkin.handle(request, Utc::now()).await?;
    Ok(Json(reply))
}
