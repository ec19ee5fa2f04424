use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docket_core::EntityKind;
use serde_json::json;
use tracing::{error, warn};

use crate::weather::WeatherError;

/// Every handler failure, rendered as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] docket_core::Error),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(&'static str),

    #[error(transparent)]
    Weather(#[from] WeatherError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(err) => match err {
                docket_core::Error::NotFound { .. } => StatusCode::NOT_FOUND,
                docket_core::Error::Validation(_) => StatusCode::BAD_REQUEST,
                docket_core::Error::Conflict(_) => StatusCode::CONFLICT,
                docket_core::Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
                docket_core::Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Weather(err) => {
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Core(docket_core::Error::Validation(msg) | docket_core::Error::Conflict(msg)) => {
                msg.clone()
            }
            Self::Core(docket_core::Error::NotFound { kind, .. }) => match kind {
                EntityKind::Task => "Task not found",
                EntityKind::Subtask => "Subtask not found",
                EntityKind::List => "List not found",
            }
            .to_string(),
            Self::Core(docket_core::Error::InvalidCredentials) => "Invalid credentials".to_string(),
            Self::Core(docket_core::Error::Store(_)) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
