use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Errors surfaced by the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Gemini API error: {0}")]
    Upstream(String),
    #[error("{0}")]
    Shell(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Shell(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RelayError::InvalidInput("Command is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Upstream("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_message_prefix() {
        let err = RelayError::Upstream("quota exceeded".into());
        assert_eq!(err.to_string(), "Gemini API error: quota exceeded");
    }
}
