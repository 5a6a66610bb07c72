use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "vision-ocr-server")]
#[command(about = "OCR gateway for remote text recognition backends")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "3000")]
    pub port: u16,

    /// Base URL of the recognition backend
    #[arg(long, env = "AZURE_CV_ENDPOINT")]
    pub endpoint: String,

    /// Subscription key for the recognition backend
    #[arg(long, env = "AZURE_CV_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Backend flavour: synchronous image analysis or job-based read
    #[arg(long, env = "OCR_BACKEND", value_enum, default_value = "image-analysis")]
    pub backend: BackendKind,

    /// Language hint for the job-based backend (e.g., "en", "de")
    #[arg(long, env = "OCR_LANGUAGE")]
    pub language: Option<String>,

    /// Delay between status polls of a submitted job, in milliseconds
    #[arg(long, env = "OCR_POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,

    /// Number of status polls before a job is reported as timed out
    #[arg(long, env = "OCR_MAX_POLLS", default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_polls: u32,

    /// Timeout for each outbound HTTP request, in seconds
    #[arg(long, env = "OCR_REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Directory annotated images are written to
    #[arg(long, env = "OCR_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Which remote API the adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Image Analysis: one blocking call returns the full result
    ImageAnalysis,
    /// Read: submission returns an operation that must be polled
    Read,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub backend: BackendConfig,
    pub poller: PollerConfig,
    pub artifact_dir: PathBuf,
}

/// Connection settings for the recognition backend
#[derive(Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub endpoint: String,
    pub api_key: String,
    pub language: Option<String>,
    pub request_timeout: Duration,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("language", &self.language)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Retry policy for job-based backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

/// Default location for annotated images when none is configured
pub fn default_artifact_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vision-ocr-server")
        .join("annotated")
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            backend: BackendConfig {
                kind: args.backend,
                endpoint: args.endpoint.trim_end_matches('/').to_string(),
                api_key: args.api_key,
                language: args.language.filter(|l| !l.trim().is_empty()),
                request_timeout: Duration::from_secs(args.request_timeout_secs),
            },
            poller: PollerConfig {
                interval: Duration::from_millis(args.poll_interval_ms),
                max_attempts: args.max_polls,
            },
            artifact_dir: args.artifact_dir.unwrap_or_else(default_artifact_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Config {
        let mut argv = vec![
            "vision-ocr-server",
            "--endpoint",
            "https://example.cognitiveservices.azure.com/",
            "--api-key",
            "secret",
        ];
        argv.extend_from_slice(extra);
        Config::from(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.backend.kind, BackendKind::ImageAnalysis);
        assert_eq!(config.poller, PollerConfig::default());
        assert_eq!(config.max_file_size, 52_428_800);
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let config = parse(&[]);
        assert_eq!(
            config.backend.endpoint,
            "https://example.cognitiveservices.azure.com"
        );
    }

    #[test]
    fn test_read_backend_and_poll_settings() {
        let config = parse(&[
            "--backend",
            "read",
            "--poll-interval-ms",
            "250",
            "--max-polls",
            "4",
            "--language",
            "de",
        ]);
        assert_eq!(config.backend.kind, BackendKind::Read);
        assert_eq!(config.poller.interval, Duration::from_millis(250));
        assert_eq!(config.poller.max_attempts, 4);
        assert_eq!(config.backend.language.as_deref(), Some("de"));
    }

    #[test]
    fn test_zero_max_polls_rejected() {
        let result = Args::try_parse_from([
            "vision-ocr-server",
            "--endpoint",
            "https://example.com",
            "--api-key",
            "secret",
            "--max-polls",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = parse(&[]);
        let rendered = format!("{:?}", config.backend);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
