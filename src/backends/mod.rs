//! Recognition backend implementations
//!
//! Each backend wraps one remote API behind the `RecognitionBackend` trait.
//! The configured kind decides which one is built at startup.

pub mod image_analysis;
pub mod payload;
pub mod read;

use crate::config::{BackendConfig, BackendKind};
use crate::engine::{BackendStyle, RecognitionBackend};
use crate::error::OcrError;
use payload::ApiErrorBody;
use reqwest::{Client, Response};
use serde::Serialize;
use std::sync::Arc;

/// Header carrying the subscription key on every backend call
pub(crate) const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Information about the active backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub style: BackendStyle,
}

impl BackendInfo {
    pub fn of(backend: &dyn RecognitionBackend) -> Self {
        Self {
            name: backend.name(),
            description: backend.description(),
            style: backend.style(),
        }
    }
}

/// Build the backend selected in the configuration
pub fn build(
    config: &BackendConfig,
    client: Client,
) -> Result<Arc<dyn RecognitionBackend>, OcrError> {
    if config.endpoint.trim().is_empty() {
        return Err(OcrError::InitializationError(
            "Missing backend endpoint (AZURE_CV_ENDPOINT)".to_string(),
        ));
    }
    if config.api_key.trim().is_empty() {
        return Err(OcrError::InitializationError(
            "Missing backend key (AZURE_CV_KEY)".to_string(),
        ));
    }

    let backend: Arc<dyn RecognitionBackend> = match config.kind {
        BackendKind::ImageAnalysis => {
            Arc::new(image_analysis::ImageAnalysisBackend::new(config, client))
        }
        BackendKind::Read => Arc::new(read::ReadBackend::new(config, client)),
    };

    tracing::info!(
        "Using {} backend ({:?}) at {}",
        backend.name(),
        backend.style(),
        config.endpoint
    );

    Ok(backend)
}

/// Turn a non-2xx backend response into a `BackendAnalysis` error,
/// preferring the message from the backend's error envelope.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, OcrError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|envelope| match (envelope.error.code, envelope.error.message) {
            (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
            (None, Some(message)) => Some(message),
            (Some(code), None) => Some(code),
            (None, None) => None,
        })
        .unwrap_or_else(|| format!("backend responded with status {}", status.as_u16()));

    tracing::warn!("Backend rejected request ({}): {}", status, detail);
    Err(OcrError::BackendAnalysis(detail))
}
