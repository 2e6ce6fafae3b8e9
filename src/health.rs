use axum::{extract::State, routing::get, Json, Router};
use tracing::{error, instrument};

use crate::{
    error::{AppError, MessageBody, Result},
    state::AppState,
};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// 200 while the database answers, 503 otherwise.
#[instrument(skip(state))]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<MessageBody>> {
    state.users.ping().await.map_err(|e| {
        error!(error = %e, "database unreachable");
        AppError::Unavailable
    })?;
    Ok(Json(MessageBody::new("OK")))
}
