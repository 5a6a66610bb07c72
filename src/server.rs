use crate::backends::BackendInfo;
use crate::config::Config;
use crate::engine::LineResult;
use crate::error::OcrError;
use crate::ocr::{AnalysisOutcome, OcrProcessor};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<OcrProcessor>,
    pub config: Arc<Config>,
}

/// JSON body for URL-based analysis
#[derive(Debug, Deserialize)]
pub struct UriRequest {
    pub uri: String,
    #[serde(default)]
    pub include_annotation: bool,
}

/// Analysis response
#[derive(Serialize)]
pub struct AnalysisResponse {
    pub text: String,
    pub lines: Vec<LineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_with_boxes_path: Option<String>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
    pub backend: &'static str,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub backend: BackendInfo,
    pub max_file_size_bytes: usize,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let processor = OcrProcessor::new(&config)?;
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Annotated images go to {:?}", config.artifact_dir);

    let state = AppState {
        processor: Arc::new(processor),
        config: Arc::new(config),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .route("/api/v1/analysis/", post(handle_analysis))
        .route("/api/v1/analysis", post(handle_analysis))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size + FORM_OVERHEAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Uploaded file plus the form's annotation flag
struct Upload {
    data: Vec<u8>,
    include_annotation: bool,
}

/// Handle analysis requests: multipart upload or JSON `{uri}`
async fn handle_analysis(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<AnalysisResponse>, OcrError> {
    let start = Instant::now();

    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let outcome = if is_multipart {
        let declared_size = request
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        let max = state.config.max_file_size;

        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| OcrError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?;
        let upload = read_upload(multipart)
            .await
            .map_err(|e| match e {
                UploadError::TooLarge => OcrError::ImageTooLarge {
                    size: declared_size.unwrap_or(max + 1),
                    max,
                },
                UploadError::Rejected(e) => e,
            })?;

        if upload.data.len() > max {
            return Err(OcrError::ImageTooLarge {
                size: upload.data.len(),
                max,
            });
        }

        state
            .processor
            .analyze_from_bytes(upload.data, upload.include_annotation)
            .await?
    } else {
        let Json(body) = Json::<UriRequest>::from_request(request, &state)
            .await
            .map_err(|_| {
                OcrError::InvalidRequest("Missing URI in JSON or file upload".to_string())
            })?;

        state
            .processor
            .analyze_from_url(&body.uri, body.include_annotation)
            .await?
    };

    let processing_time_ms = start.elapsed().as_millis() as u64;
    let backend = state.processor.backend_info().name;

    tracing::info!(
        "Analysis completed in {}ms, lines: {}, annotated: {}",
        processing_time_ms,
        outcome.result.lines().len(),
        outcome.annotated_image_path.is_some()
    );

    Ok(Json(AnalysisResponse::new(
        outcome,
        processing_time_ms,
        backend,
    )))
}

enum UploadError {
    /// The body limit cut the stream off
    TooLarge,
    Rejected(OcrError),
}

impl From<OcrError> for UploadError {
    fn from(err: OcrError) -> Self {
        UploadError::Rejected(err)
    }
}

fn multipart_error(context: &str, err: MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return UploadError::TooLarge;
    }
    UploadError::Rejected(OcrError::InvalidRequest(format!("{}: {}", context, err)))
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, UploadError> {
    let mut data: Option<Vec<u8>> = None;
    let mut include_annotation = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to parse multipart", e))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                if field.file_name() == Some("") {
                    return Err(OcrError::InvalidRequest("No file selected".to_string()).into());
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read file data", e))?;
                data = Some(bytes.to_vec());
            }
            "include_annotation" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Invalid include_annotation", e))?;
                include_annotation = parse_flag(&value);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    // A form without a file is treated like a request with neither input
    let data = data.ok_or_else(|| {
        OcrError::InvalidRequest("Missing URI in JSON or file upload".to_string())
    })?;
    if data.is_empty() {
        return Err(OcrError::InvalidRequest("No file selected".to_string()).into());
    }

    Ok(Upload {
        data,
        include_annotation,
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

impl AnalysisResponse {
    fn new(outcome: AnalysisOutcome, processing_time_ms: u64, backend: &'static str) -> Self {
        let (text, lines) = outcome.result.into_parts();
        Self {
            text,
            lines,
            image_with_boxes_path: outcome
                .annotated_image_path
                .map(|path| path.to_string_lossy().into_owned()),
            warnings: outcome.warnings,
            processing_time_ms,
            backend,
        }
    }
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let poller = state.processor.poller();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.processor.backend_info(),
        max_file_size_bytes: state.config.max_file_size,
        poll_interval_ms: poller.interval().as_millis() as u64,
        max_polls: poller.max_attempts(),
    })
}
