//! Request orchestration: submit, resolve, normalize, optionally annotate.

use crate::annotation;
use crate::backends::{self, BackendInfo};
use crate::config::Config;
use crate::engine::{BackendResult, LineResult, RecognitionBackend, RecognitionJob, RecognitionResult};
use crate::error::OcrError;
use crate::fetch::{HttpFetcher, ImageFetcher};
use crate::normalizer::normalize;
use crate::poller::Poller;
use crate::store::ArtifactStore;
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::sync::Arc;

/// File name prefix for rendered images
pub const ANNOTATION_PREFIX: &str = "image_with_boxes";

/// Result of one analysis request
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: RecognitionResult,
    pub annotated_image_path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Stateless across requests; one instance is shared by all handlers.
pub struct OcrProcessor {
    backend: Arc<dyn RecognitionBackend>,
    poller: Poller,
    fetcher: Arc<dyn ImageFetcher>,
    store: ArtifactStore,
}

impl OcrProcessor {
    pub fn new(config: &Config) -> Result<Self, OcrError> {
        let client = Client::builder()
            .timeout(config.backend.request_timeout)
            .build()
            .map_err(|e| {
                OcrError::InitializationError(format!("Failed to create HTTP client: {}", e))
            })?;

        let backend = backends::build(&config.backend, client.clone())?;
        let fetcher = Arc::new(HttpFetcher::new(client, config.max_file_size));

        Ok(Self::from_parts(
            backend,
            Poller::new(&config.poller),
            fetcher,
            ArtifactStore::new(&config.artifact_dir),
        ))
    }

    pub fn from_parts(
        backend: Arc<dyn RecognitionBackend>,
        poller: Poller,
        fetcher: Arc<dyn ImageFetcher>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            backend,
            poller,
            fetcher,
            store,
        }
    }

    pub fn backend_info(&self) -> BackendInfo {
        BackendInfo::of(self.backend.as_ref())
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Analyze an image the backend downloads by URL.
    ///
    /// Annotation downloads the image a second time; if that or any later
    /// annotation step fails the text result is still returned, with the
    /// failure listed in `warnings`.
    pub async fn analyze_from_url(
        &self,
        uri: &str,
        include_annotation: bool,
    ) -> Result<AnalysisOutcome, OcrError> {
        validate_uri(uri)?;

        let submitted = self.backend.analyze_by_reference(uri).await?;
        let result = self.resolve(submitted).await?;

        if !(include_annotation && result.has_lines()) {
            return Ok(AnalysisOutcome::text_only(result));
        }

        let annotated = match self.fetcher.fetch(uri).await {
            Ok(data) => self.annotate(data, result.lines()).await,
            Err(e) => Err(e),
        };

        Ok(AnalysisOutcome::with_annotation(result, annotated))
    }

    /// Analyze uploaded image bytes
    pub async fn analyze_from_bytes(
        &self,
        data: Vec<u8>,
        include_annotation: bool,
    ) -> Result<AnalysisOutcome, OcrError> {
        if data.is_empty() {
            return Err(OcrError::MalformedInput("Image data is empty".to_string()));
        }

        let submitted = self.backend.analyze_by_bytes(&data).await?;
        let result = self.resolve(submitted).await?;

        if !(include_annotation && result.has_lines()) {
            return Ok(AnalysisOutcome::text_only(result));
        }

        let annotated = self.annotate(data, result.lines()).await;
        Ok(AnalysisOutcome::with_annotation(result, annotated))
    }

    async fn resolve(&self, submitted: BackendResult) -> Result<RecognitionResult, OcrError> {
        let payload = match submitted {
            BackendResult::Immediate(payload) => payload,
            BackendResult::Deferred(handle) => {
                let mut job = RecognitionJob::new(handle);
                self.poller.run(self.backend.as_ref(), &mut job).await?
            }
        };

        let result = normalize(payload);
        tracing::info!(
            "Recognized {} line(s), text length: {}",
            result.lines().len(),
            result.text().len()
        );
        Ok(result)
    }

    async fn annotate(&self, data: Vec<u8>, lines: &[LineResult]) -> Result<PathBuf, OcrError> {
        let store = self.store.clone();
        let lines = lines.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut canvas = annotation::decode_image(&data)?.into_rgba8();
            let drawn = annotation::render(&mut canvas, &lines);
            tracing::debug!("Drew {} of {} line outline(s)", drawn, lines.len());
            store.save(&canvas, ANNOTATION_PREFIX)
        })
        .await
        .map_err(|e| OcrError::Internal(format!("Annotation task failed: {}", e)))?
    }
}

impl AnalysisOutcome {
    fn text_only(result: RecognitionResult) -> Self {
        Self {
            result,
            annotated_image_path: None,
            warnings: Vec::new(),
        }
    }

    fn with_annotation(result: RecognitionResult, annotated: Result<PathBuf, OcrError>) -> Self {
        match annotated {
            Ok(path) => Self {
                result,
                annotated_image_path: Some(path),
                warnings: Vec::new(),
            },
            Err(e) => {
                tracing::warn!("Annotation failed, returning text only: {}", e);
                Self {
                    result,
                    annotated_image_path: None,
                    warnings: vec![format!("Annotation skipped: {}", e)],
                }
            }
        }
    }
}

fn validate_uri(uri: &str) -> Result<(), OcrError> {
    let url = Url::parse(uri)
        .map_err(|e| OcrError::InvalidRequest(format!("Invalid image URI {:?}: {}", uri, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(OcrError::InvalidRequest(format!(
            "Unsupported URI scheme {:?}",
            other
        ))),
    }
}
