use crate::error::OcrError;
use async_trait::async_trait;
use reqwest::Client;

/// Downloads the source image for URL-based annotation
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, OcrError>;
}

pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, OcrError> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| OcrError::Transport(format!("Failed to fetch image: {}", e)))?
            .error_for_status()
            .map_err(|e| OcrError::Transport(format!("Failed to fetch image: {}", e)))?;

        if let Some(length) = response.content_length() {
            if length as usize > self.max_bytes {
                return Err(OcrError::ImageTooLarge {
                    size: length as usize,
                    max: self.max_bytes,
                });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OcrError::Transport(format!("Failed to read image body: {}", e)))?;

        if bytes.len() > self.max_bytes {
            return Err(OcrError::ImageTooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }

        tracing::debug!("Fetched {} bytes from image URL", bytes.len());
        Ok(bytes.to_vec())
    }
}
