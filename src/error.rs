//! Error taxonomy shared by the managers and the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::{auth::services::AccountError, images::services::ImageError};

/// Category of a failure. The HTTP status for each category is fixed by
/// [`ErrorKind::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Unauthorized,
    MethodNotAllowed,
    /// Database unreachable or failing.
    Unavailable,
    /// Object store or notification channel failed.
    Dependency,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message may leak internals and must be replaced.
    fn is_opaque(self) -> bool {
        matches!(
            self,
            ErrorKind::Unavailable | ErrorKind::Dependency | ErrorKind::Internal
        )
    }
}

/// Error returned by handlers, rendered as `{"message": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error(
        "Not Found. The requested URL was not found on the server. If you entered the URL \
         manually please check your spelling and try again."
    )]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Service Unavailable")]
    Unavailable,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Account(e) => e.kind(),
            AppError::Image(e) => e.kind(),
            AppError::BadRequest(_) => ErrorKind::Validation,
            AppError::Unauthorized => ErrorKind::Unauthorized,
            AppError::NotFound => ErrorKind::NotFound,
            AppError::MethodNotAllowed => ErrorKind::MethodNotAllowed,
            AppError::Unavailable => ErrorKind::Unavailable,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.status();
        let message = if kind.is_opaque() {
            error!(error = ?self, %status, "request failed");
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };
        (status, Json(MessageBody { message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
