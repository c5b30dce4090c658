use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use super::method_not_allowed;
use crate::error::Result;
use crate::models::firewall_command;
use crate::services::ledger;
use crate::state::AppState;

/// Create command routes
pub fn commands_routes(state: AppState) -> Router {
    Router::new()
        .route("/{id}", get(get_command).fallback(method_not_allowed))
        .with_state(state)
}

/// A single command with its status and result
async fn get_command(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<firewall_command::Model>> {
    let command = ledger::get_command(&state.db, id).await?;
    Ok(Json(command))
}
