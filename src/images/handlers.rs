use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{instrument, warn};

use super::{
    repo_types::ProfileImage,
    services::{ImageError, UploadItem},
};
use crate::{auth::extractors::AuthUser, error::Result, state::AppState};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB

pub fn pic_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/user/self/pic",
            post(upload_pic).get(get_pic).delete(delete_pic),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// POST /v1/user/self/pic (multipart). The first part carrying a filename is
/// the picture, conventionally sent as `profilePic`.
#[instrument(skip(state, auth, mp), fields(user_id = %auth.id))]
pub async fn upload_pic(
    State(state): State<AppState>,
    auth: AuthUser,
    mp: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ProfileImage>)> {
    let mut mp = mp.map_err(|e| {
        warn!(error = %e, "not a multipart request");
        ImageError::NoFile
    })?;

    let mut file = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ImageError::MalformedUpload(e.body_text()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let body = field
            .bytes()
            .await
            .map_err(|e| ImageError::MalformedUpload(e.body_text()))?;
        file = Some(UploadItem { file_name, body });
        break;
    }

    let image = state.images.upload(&auth.email, file).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id))]
pub async fn get_pic(State(state): State<AppState>, auth: AuthUser) -> Result<Json<ProfileImage>> {
    let image = state.images.get(&auth.email).await?;
    Ok(Json(image))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id))]
pub async fn delete_pic(State(state): State<AppState>, auth: AuthUser) -> Result<StatusCode> {
    state.images.delete(&auth.email).await?;
    Ok(StatusCode::NO_CONTENT)
}
