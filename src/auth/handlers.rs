use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{ProfilePatch, PublicUser, RegisterRequest, VerifyQuery},
        extractors::AuthUser,
    },
    error::{AppError, MessageBody, Result},
    state::AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/user", post(register))
        .route("/v1/verify-email", get(verify_email))
}

pub fn self_routes() -> Router<AppState> {
    Router::new().route("/v1/user/self", get(get_self).put(update_self))
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicUser>)> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "rejected registration body");
        AppError::BadRequest("first_name, last_name, email and password are required".into())
    })?;
    let user = state.accounts.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    query: std::result::Result<Query<VerifyQuery>, QueryRejection>,
) -> Result<Json<MessageBody>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    state.accounts.verify_email(query.token.as_deref()).await?;
    Ok(Json(MessageBody::new("Email verified")))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id))]
pub async fn get_self(State(state): State<AppState>, auth: AuthUser) -> Result<Json<PublicUser>> {
    let user = state.accounts.get_profile(&auth.email).await?;
    Ok(Json(user))
}

#[instrument(skip(state, auth, body), fields(user_id = %auth.id))]
pub async fn update_self(
    State(state): State<AppState>,
    auth: AuthUser,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(body) = body.map_err(|e| {
        warn!(error = %e, "rejected update body");
        AppError::BadRequest("request body must be a JSON object".into())
    })?;
    let patch = ProfilePatch::from_json(body)?;
    state.accounts.update_profile(&auth.email, patch).await?;
    Ok(StatusCode::NO_CONTENT)
}
