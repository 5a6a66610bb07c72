use image::{ImageFormat, Rgba, RgbaImage};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Use atomic counter to give each test a unique port
static PORT_COUNTER: AtomicU16 = AtomicU16::new(9400);

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Point {
    x: f32,
    y: f32,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Word {
    text: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Line {
    text: String,
    bounding_box: Vec<Point>,
    words: Vec<Word>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HealthResponse {
    status: String,
    version: String,
}

struct TestServer {
    child: Child,
    port: u16,
}

impl TestServer {
    fn start(backend_uri: &str, artifact_dir: &Path, extra: &[&str]) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);

        let child = Command::new(env!("CARGO_BIN_EXE_vision-ocr-server"))
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .args(["--endpoint", backend_uri, "--api-key", "test-key"])
            .arg("--artifact-dir")
            .arg(artifact_dir)
            .args(extra)
            .spawn()
            .expect("Failed to start server");

        Self { child, port }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    async fn wait_ready(&self, client: &reqwest::Client) {
        for _ in 0..100 {
            let probe = client
                .get(format!("{}/health", self.base_url()))
                .send()
                .await;
            if matches!(probe, Ok(ref response) if response.status().is_success()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("server on port {} never became ready", self.port);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

fn sample_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbaImage::from_pixel(48, 24, Rgba([255, 255, 255, 255]))
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("failed to encode sample image");
    bytes
}

/// Mock backend answering image analysis with one line, and serving the image
async fn mock_backend(lines: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/computervision/imageanalysis:analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "readResult": {"blocks": [{"lines": lines}]}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/images/sample.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sample_png()))
        .mount(&server)
        .await;

    server
}

fn hello_line() -> serde_json::Value {
    json!([{
        "text": "Hello",
        "boundingPolygon": [{"x": 0, "y": 0}, {"x": 10, "y": 0}, {"x": 10, "y": 5}, {"x": 0, "y": 5}],
        "words": [{"text": "Hello", "boundingPolygon": [], "confidence": 0.97}]
    }])
}

async fn analyze_uri(
    client: &reqwest::Client,
    server: &TestServer,
    body: serde_json::Value,
) -> (reqwest::StatusCode, serde_json::Value) {
    let response = client
        .post(format!("{}/api/v1/analysis/", server.base_url()))
        .json(&body)
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    (status, response.json().await.expect("Failed to parse response"))
}

#[tokio::test]
async fn test_health_endpoint() {
    let backend = mock_backend(hello_line()).await;
    let artifacts = tempfile::tempdir().unwrap();
    let server = TestServer::start(&backend.uri(), artifacts.path(), &[]);
    let client = reqwest::Client::new();
    server.wait_ready(&client).await;

    let response: HealthResponse = client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(response.status, "ok");
}

#[tokio::test]
async fn test_uri_without_annotation_has_no_path_key() {
    let backend = mock_backend(hello_line()).await;
    let artifacts = tempfile::tempdir().unwrap();
    let server = TestServer::start(&backend.uri(), artifacts.path(), &[]);
    let client = reqwest::Client::new();
    server.wait_ready(&client).await;

    let uri = format!("{}/images/sample.png", backend.uri());
    let (status, body) =
        analyze_uri(&client, &server, json!({"uri": uri, "include_annotation": false})).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["text"], "Hello");
    assert!(body.get("image_with_boxes_path").is_none());

    let lines: Vec<Line> = serde_json::from_value(body["lines"].clone()).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].bounding_box.len(), 4);
    assert_eq!(lines[0].words[0].text, "Hello");
}

#[tokio::test]
async fn test_uri_with_annotation_writes_file() {
    let backend = mock_backend(hello_line()).await;
    let artifacts = tempfile::tempdir().unwrap();
    let server = TestServer::start(&backend.uri(), artifacts.path(), &[]);
    let client = reqwest::Client::new();
    server.wait_ready(&client).await;

    let uri = format!("{}/images/sample.png", backend.uri());
    let (status, body) =
        analyze_uri(&client, &server, json!({"uri": uri, "include_annotation": true})).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    let saved = body["image_with_boxes_path"]
        .as_str()
        .expect("missing image_with_boxes_path");
    let saved = Path::new(saved);
    assert!(saved.exists());
    assert!(saved.starts_with(artifacts.path()));

    let name = saved.file_name().unwrap().to_str().unwrap();
    let stamp = name
        .strip_prefix("image_with_boxes_")
        .and_then(|rest| rest.strip_suffix(".png"))
        .expect("unexpected file name");
    assert!(stamp.len() >= 14 && stamp.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn test_no_text_found() {
    let backend = mock_backend(json!([])).await;
    let artifacts = tempfile::tempdir().unwrap();
    let server = TestServer::start(&backend.uri(), artifacts.path(), &[]);
    let client = reqwest::Client::new();
    server.wait_ready(&client).await;

    let uri = format!("{}/images/sample.png", backend.uri());
    let (status, body) =
        analyze_uri(&client, &server, json!({"uri": uri, "include_annotation": true})).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["text"], "No text found");
    assert_eq!(body["lines"].as_array().unwrap().len(), 0);
    assert!(body.get("image_with_boxes_path").is_none());
}

#[tokio::test]
async fn test_file_upload() {
    let backend = mock_backend(hello_line()).await;
    let artifacts = tempfile::tempdir().unwrap();
    let server = TestServer::start(&backend.uri(), artifacts.path(), &[]);
    let client = reqwest::Client::new();
    server.wait_ready(&client).await;

    let part = Part::bytes(sample_png())
        .file_name("sample.png")
        .mime_str("image/png")
        .unwrap();
    let form = Form::new()
        .part("file", part)
        .text("include_annotation", "true");

    let body: serde_json::Value = client
        .post(format!("{}/api/v1/analysis/", server.base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(body["text"], "Hello");
    let saved = body["image_with_boxes_path"].as_str().unwrap();
    assert!(Path::new(saved).exists());
}

#[tokio::test]
async fn test_missing_uri_returns_error() {
    let backend = mock_backend(hello_line()).await;
    let artifacts = tempfile::tempdir().unwrap();
    let server = TestServer::start(&backend.uri(), artifacts.path(), &[]);
    let client = reqwest::Client::new();
    server.wait_ready(&client).await;

    let (status, body) = analyze_uri(&client, &server, json!({"image": "nope"})).await;

    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_read_backend_timeout_is_gateway_timeout() {
    let backend = MockServer::start().await;
    let operation_id = "9b2f6c1e-0d4a-4e8b-a7c3-5f1d2e3c4b5a";

    Mock::given(method("POST"))
        .and(path("/vision/v3.2/read/analyze"))
        .respond_with(ResponseTemplate::new(202).insert_header(
            "Operation-Location",
            format!(
                "{}/vision/v3.2/read/analyzeResults/{}",
                backend.uri(),
                operation_id
            ),
        ))
        .mount(&backend)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/vision/v3.2/read/analyzeResults/{}",
            operation_id
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&backend)
        .await;

    let artifacts = tempfile::tempdir().unwrap();
    let server = TestServer::start(
        &backend.uri(),
        artifacts.path(),
        &["--backend", "read", "--poll-interval-ms", "5", "--max-polls", "3"],
    );
    let client = reqwest::Client::new();
    server.wait_ready(&client).await;

    let (status, body) = analyze_uri(
        &client,
        &server,
        json!({"uri": "https://images.example.com/sample.png"}),
    )
    .await;

    assert_eq!(status, reqwest::StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "TIMEOUT");
}
