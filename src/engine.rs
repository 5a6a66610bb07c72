use crate::backends::payload::AnalysisPayload;
use crate::error::OcrError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text returned when the backend succeeded but detected nothing
pub const NO_TEXT_FOUND: &str = "No text found";

/// A vertex in backend-native pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordResult {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResult {
    pub text: String,
    #[serde(rename = "bounding_box")]
    pub bounding_polygon: Vec<Point>,
    pub words: Vec<WordResult>,
}

/// Canonical recognition output.
///
/// `lines` is empty exactly when `text` is [`NO_TEXT_FOUND`]; the only way to
/// build one is [`RecognitionResult::from_lines`], which keeps that true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    text: String,
    lines: Vec<LineResult>,
}

impl RecognitionResult {
    pub fn from_lines(lines: Vec<LineResult>) -> Self {
        if lines.is_empty() {
            return Self::no_text();
        }

        let text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self { text, lines }
    }

    pub fn no_text() -> Self {
        Self {
            text: NO_TEXT_FOUND.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> &[LineResult] {
        &self.lines
    }

    pub fn has_lines(&self) -> bool {
        !self.lines.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<LineResult>) {
        (self.text, self.lines)
    }
}

/// Opaque reference to an in-flight backend operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self(operation_id.into())
    }

    pub fn operation_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a submission produced
#[derive(Debug, Clone)]
pub enum BackendResult {
    /// The backend answered with the finished analysis
    Immediate(AnalysisPayload),
    /// The backend accepted the work; poll the handle for the result
    Deferred(JobHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

/// One status query answer from a job-based backend
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    /// Present only once the job has succeeded
    pub payload: Option<AnalysisPayload>,
}

/// Book-keeping for one submitted analysis. Only the poller mutates it.
#[derive(Debug, Clone)]
pub struct RecognitionJob {
    pub handle: JobHandle,
    pub status: JobStatus,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl RecognitionJob {
    pub fn new(handle: JobHandle) -> Self {
        Self {
            handle,
            status: JobStatus::Pending,
            attempt: 0,
            created_at: Utc::now(),
        }
    }
}

/// How a backend delivers results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStyle {
    Synchronous,
    Job,
}

/// Trait that all recognition backends must implement
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Returns the backend identifier (e.g., "image-analysis", "read")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the backend
    fn description(&self) -> &'static str;

    fn style(&self) -> BackendStyle;

    /// Submit an image the backend downloads itself
    async fn analyze_by_reference(&self, uri: &str) -> Result<BackendResult, OcrError>;

    /// Submit raw image bytes
    async fn analyze_by_bytes(&self, data: &[u8]) -> Result<BackendResult, OcrError>;

    /// Query the state of a deferred analysis. Must be free of side effects.
    async fn poll_status(&self, handle: &JobHandle) -> Result<JobReport, OcrError> {
        Err(OcrError::Protocol(format!(
            "{} backend does not issue job handles (got {})",
            self.name(),
            handle
        )))
    }
}
