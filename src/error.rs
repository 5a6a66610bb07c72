use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to initialize recognition backend: {0}")]
    InitializationError(String),

    /// Connectivity failure towards the backend or an external image URL
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with something we cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend reported that the analysis failed
    #[error("Backend analysis failed: {0}")]
    BackendAnalysis(String),

    #[error("Analysis did not finish after {attempts} status polls")]
    Timeout { attempts: u32 },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to store artifact: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    pub fn code(&self) -> &'static str {
        match self {
            OcrError::InitializationError(_) => "INIT_ERROR",
            OcrError::Transport(_) => "TRANSPORT_ERROR",
            OcrError::Protocol(_) => "PROTOCOL_ERROR",
            OcrError::BackendAnalysis(_) => "BACKEND_ANALYSIS_ERROR",
            OcrError::Timeout { .. } => "TIMEOUT",
            OcrError::MalformedInput(_) => "MALFORMED_INPUT",
            OcrError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            OcrError::InvalidRequest(_) => "INVALID_REQUEST",
            OcrError::Storage(_) => "STORAGE_ERROR",
            OcrError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            OcrError::Transport(_) | OcrError::Protocol(_) | OcrError::BackendAnalysis(_) => {
                StatusCode::BAD_GATEWAY
            }
            OcrError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            OcrError::MalformedInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OcrError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            OcrError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OcrError::InitializationError(_) | OcrError::Storage(_) | OcrError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for OcrError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            OcrError::Protocol(format!("Unexpected response body: {}", err))
        } else {
            OcrError::Transport(err.to_string())
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            OcrError::Timeout { attempts: 10 }.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            OcrError::Protocol("bad header".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            OcrError::InvalidRequest("nope".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OcrError::ImageTooLarge { size: 2, max: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_timeout_message_is_distinct_from_backend_failure() {
        let timeout = OcrError::Timeout { attempts: 10 }.to_string();
        let failed = OcrError::BackendAnalysis("operation failed".into()).to_string();
        assert!(timeout.contains("10 status polls"));
        assert_ne!(timeout, failed);
    }
}
