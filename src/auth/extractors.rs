use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Principal resolved from HTTP Basic credentials (`email:password`).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let (email, password) = parse_basic(header).ok_or_else(|| {
            warn!("malformed basic credentials");
            AppError::Unauthorized
        })?;

        let user = state.accounts.authenticate(&email, &password).await?;
        Ok(AuthUser {
            id: user.id,
            email: user.email,
        })
    }
}

/// Splits `Basic base64(email:password)`. The password may contain ':'.
pub(crate) fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (email, password) = decoded.split_once(':')?;
    if email.is_empty() {
        return None;
    }
    Some((email.to_string(), password.to_string()))
}
