//! OCR collaborator: extracts raw multi-line text from image/PDF uploads.
//!
//! The real implementation talks to an Azure-style Read API: submit the
//! document, then poll the returned operation until it settles. The call is
//! made before any database write so an OCR failure can never corrupt a BOM.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("OCR service rejected the document: {0}")]
    Rejected(String),

    #[error("OCR processing did not complete in time")]
    Timeout,

    #[error("OCR is not configured; set APP__OCR_ENDPOINT and APP__OCR_API_KEY")]
    NotConfigured,
}

#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Extracts text from an image or PDF byte stream, one detected line
    /// per output line.
    async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, OcrError>;
}

/// Client for a hosted Read API (Azure Computer Vision wire shape).
pub struct ReadApiOcrClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl ReadApiOcrClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        poll_interval: Duration,
        poll_attempts: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
            poll_interval,
            poll_attempts,
        }
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/vision/v3.2/read/analyze",
            self.endpoint.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadResultEnvelope {
    status: String,
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    read_results: Vec<ReadPage>,
}

#[derive(Debug, Deserialize)]
struct ReadPage {
    lines: Vec<ReadLine>,
}

#[derive(Debug, Deserialize)]
struct ReadLine {
    text: String,
}

#[async_trait]
impl OcrClient for ReadApiOcrClient {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, OcrError> {
        let submit = self
            .http
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !submit.status().is_success() {
            let status = submit.status();
            let body = submit.text().await.unwrap_or_default();
            return Err(OcrError::Rejected(format!("{}: {}", status, body)));
        }

        let operation_url = submit
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| OcrError::Rejected("missing operation-location header".into()))?;

        for attempt in 0..self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;

            let envelope: ReadResultEnvelope = self
                .http
                .get(&operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.api_key)
                .send()
                .await?
                .json()
                .await?;

            debug!(attempt, status = %envelope.status, "OCR poll");

            match envelope.status.as_str() {
                "succeeded" => {
                    let text = envelope
                        .analyze_result
                        .map(|result| {
                            result
                                .read_results
                                .iter()
                                .flat_map(|page| page.lines.iter())
                                .map(|line| line.text.as_str())
                                .collect::<Vec<_>>()
                                .join("\n")
                        })
                        .unwrap_or_default();
                    return Ok(text);
                }
                "failed" => {
                    return Err(OcrError::Rejected("read operation failed".into()));
                }
                // "notStarted" | "running"
                _ => continue,
            }
        }

        Err(OcrError::Timeout)
    }
}

/// Placeholder used when no OCR endpoint is configured; every call fails
/// with a clear message instead of hanging the import.
pub struct DisabledOcrClient;

#[async_trait]
impl OcrClient for DisabledOcrClient {
    async fn extract_text(&self, _bytes: Vec<u8>) -> Result<String, OcrError> {
        Err(OcrError::NotConfigured)
    }
}
