//! Synchronous Image Analysis backend
//!
//! A single call returns the complete read result, grouped into blocks.

use super::payload::{AnalysisPayload, TextBlock};
use super::{ensure_success, SUBSCRIPTION_KEY_HEADER};
use crate::config::BackendConfig;
use crate::engine::{BackendResult, BackendStyle, RecognitionBackend};
use crate::error::OcrError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2024-02-01";

pub struct ImageAnalysisBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct UrlRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    read_result: Option<ReadResult>,
}

#[derive(Debug, Deserialize)]
struct ReadResult {
    blocks: Option<Vec<TextBlock>>,
}

impl ImageAnalysisBackend {
    pub fn new(config: &BackendConfig, client: Client) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/computervision/imageanalysis:analyze?features=read&api-version={}",
            self.endpoint, API_VERSION
        )
    }

    async fn read_payload(&self, response: reqwest::Response) -> Result<BackendResult, OcrError> {
        let response = ensure_success(response).await?;
        let body: AnalyzeResponse = response.json().await?;
        let blocks = body.read_result.and_then(|read| read.blocks);

        tracing::debug!(
            "Image analysis returned {} block(s)",
            blocks.as_ref().map_or(0, Vec::len)
        );

        Ok(BackendResult::Immediate(AnalysisPayload::Blocks(blocks)))
    }
}

#[async_trait]
impl RecognitionBackend for ImageAnalysisBackend {
    fn name(&self) -> &'static str {
        "image-analysis"
    }

    fn description(&self) -> &'static str {
        "Image Analysis read feature, synchronous"
    }

    fn style(&self) -> BackendStyle {
        BackendStyle::Synchronous
    }

    async fn analyze_by_reference(&self, uri: &str) -> Result<BackendResult, OcrError> {
        tracing::info!("Submitting image URL to image analysis");
        let response = self
            .client
            .post(self.analyze_url())
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .json(&UrlRequest { url: uri })
            .send()
            .await?;

        self.read_payload(response).await
    }

    async fn analyze_by_bytes(&self, data: &[u8]) -> Result<BackendResult, OcrError> {
        tracing::info!("Submitting {} bytes to image analysis", data.len());
        let response = self
            .client
            .post(self.analyze_url())
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await?;

        self.read_payload(response).await
    }
}
