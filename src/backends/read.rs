//! Job-based Read backend
//!
//! Submission answers `202 Accepted` with an `Operation-Location` header.
//! The operation id at the end of that URL is polled until the job settles.

use super::payload::{AnalysisPayload, TextLine};
use super::{ensure_success, SUBSCRIPTION_KEY_HEADER};
use crate::config::BackendConfig;
use crate::engine::{BackendResult, BackendStyle, JobHandle, JobReport, JobStatus, RecognitionBackend};
use crate::error::OcrError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

pub const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// Operation ids are UUIDs in their 36 character textual form
const OPERATION_ID_LEN: usize = 36;

pub struct ReadBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    language: Option<String>,
}

#[derive(Serialize)]
struct UrlRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    status: String,
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    #[serde(default)]
    read_results: Vec<ReadPage>,
}

#[derive(Debug, Deserialize)]
struct ReadPage {
    lines: Option<Vec<TextLine>>,
}

impl ReadBackend {
    pub fn new(config: &BackendConfig, client: Client) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
        }
    }

    fn submit_request(&self) -> RequestBuilder {
        let request = self
            .client
            .post(format!("{}/vision/v3.2/read/analyze", self.endpoint))
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key);

        match &self.language {
            Some(language) => request.query(&[("language", language)]),
            None => request,
        }
    }

    async fn accept(&self, response: reqwest::Response) -> Result<BackendResult, OcrError> {
        let response = ensure_success(response).await?;
        let location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .map(|value| {
                value.to_str().map_err(|_| {
                    OcrError::Protocol(format!("{} header is not valid text", OPERATION_LOCATION_HEADER))
                })
            })
            .transpose()?;

        let operation_id = extract_operation_id(location)?;
        tracing::info!("Read operation {} accepted", operation_id);

        Ok(BackendResult::Deferred(JobHandle::new(operation_id)))
    }
}

/// Take the operation id from the tail of an `Operation-Location` value.
///
/// The id must be exactly the last 36 characters and parse as a UUID.
pub fn extract_operation_id(location: Option<&str>) -> Result<String, OcrError> {
    let location = location.map(str::trim).ok_or_else(|| {
        OcrError::Protocol(format!("Missing {} header", OPERATION_LOCATION_HEADER))
    })?;

    let start = location.len().checked_sub(OPERATION_ID_LEN).ok_or_else(|| {
        OcrError::Protocol(format!(
            "{} header too short for an operation id: {:?}",
            OPERATION_LOCATION_HEADER, location
        ))
    })?;

    let candidate = location.get(start..).ok_or_else(|| {
        OcrError::Protocol(format!(
            "{} header does not end in an operation id: {:?}",
            OPERATION_LOCATION_HEADER, location
        ))
    })?;

    uuid::Uuid::parse_str(candidate).map_err(|e| {
        OcrError::Protocol(format!(
            "{} header does not end in an operation id ({}): {:?}",
            OPERATION_LOCATION_HEADER, e, location
        ))
    })?;

    Ok(candidate.to_string())
}

fn parse_status(status: &str) -> Result<JobStatus, OcrError> {
    match status.to_ascii_lowercase().as_str() {
        "notstarted" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" => Ok(JobStatus::Failed),
        other => Err(OcrError::Protocol(format!(
            "Unknown operation status {:?}",
            other
        ))),
    }
}

fn into_report(body: OperationResponse) -> Result<JobReport, OcrError> {
    let status = parse_status(&body.status)?;
    if status != JobStatus::Succeeded {
        return Ok(JobReport {
            status,
            payload: None,
        });
    }

    let analyze_result = body.analyze_result.ok_or_else(|| {
        OcrError::Protocol("Succeeded operation carries no analyzeResult".to_string())
    })?;

    // One document per operation, so the first page holds the lines
    let lines = analyze_result
        .read_results
        .into_iter()
        .next()
        .and_then(|page| page.lines);

    Ok(JobReport {
        status,
        payload: Some(AnalysisPayload::Lines(lines)),
    })
}

#[async_trait]
impl RecognitionBackend for ReadBackend {
    fn name(&self) -> &'static str {
        "read"
    }

    fn description(&self) -> &'static str {
        "Read API v3.2, asynchronous operation with polling"
    }

    fn style(&self) -> BackendStyle {
        BackendStyle::Job
    }

    async fn analyze_by_reference(&self, uri: &str) -> Result<BackendResult, OcrError> {
        tracing::info!("Submitting image URL to read");
        let response = self
            .submit_request()
            .json(&UrlRequest { url: uri })
            .send()
            .await?;

        self.accept(response).await
    }

    async fn analyze_by_bytes(&self, data: &[u8]) -> Result<BackendResult, OcrError> {
        tracing::info!("Submitting {} bytes to read", data.len());
        let response = self
            .submit_request()
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await?;

        self.accept(response).await
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<JobReport, OcrError> {
        let response = self
            .client
            .get(format!(
                "{}/vision/v3.2/read/analyzeResults/{}",
                self.endpoint,
                handle.operation_id()
            ))
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let body: OperationResponse = response.json().await?;
        into_report(body)
    }
}
