//! Knowledge-base handoff client
//!
//! Talks to a LightRAG-compatible server. Documents go up as plain-text file
//! uploads (`POST /documents/upload`, multipart), authenticated with an
//! `X-API-Key` header. Uploads are assumed idempotent per document id, so
//! re-submitting after a partial failure is safe.

use crate::db::models::Page;
use crate::error::{IngestError, Result};
use crate::extract::artifacts::ExtractedOutput;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SERVER_URL: &str = "http://localhost:8020";

/// Destination for finished extraction results
///
/// The coordinator only needs this one operation; the trait keeps it
/// testable without a live server.
#[async_trait]
pub trait ResultHandoff: Send + Sync {
    /// Upload one document; `Err` means the knowledge base rejected it
    async fn upload(&self, doc_id: &str, text: &str) -> Result<()>;
}

/// HTTP client for the knowledge-base server
pub struct IngestClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl IngestClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        url::Url::parse(base_url).map_err(|_| IngestError::InvalidUrl(base_url.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| IngestError::ConfigError(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build a client from LIGHTRAG_SERVER_URL / LIGHTRAG_API_KEY
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("LIGHTRAG_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let api_key = std::env::var("LIGHTRAG_API_KEY").ok();
        if api_key.is_none() {
            warn!("LIGHTRAG_API_KEY not set, uploading without authentication");
        }
        Self::new(&base_url, api_key)
    }

    /// Probe the server root; false means unreachable or unhealthy
    pub async fn health_check(&self) -> bool {
        let mut request = self.client.get(&self.base_url).timeout(Duration::from_secs(10));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Knowledge-base server not responding: {}", e);
                false
            }
        }
    }

    /// Upload a text document under a stable id
    pub async fn upload_text(&self, doc_id: &str, text: &str) -> Result<()> {
        let part = Part::text(text.to_string())
            .file_name(format!("{doc_id}.txt"))
            .mime_str("text/plain")
            .map_err(|e| IngestError::HandoffRejected {
                doc_id: doc_id.to_string(),
                message: format!("building upload: {e}"),
            })?;
        let form = Form::new().part("file", part);

        let mut request = self
            .client
            .post(format!("{}/documents/upload", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|e| IngestError::HandoffRejected {
            doc_id: doc_id.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::HandoffRejected {
                doc_id: doc_id.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        info!("Uploaded document {} ({} chars)", doc_id, text.len());
        Ok(())
    }
}

#[async_trait]
impl ResultHandoff for IngestClient {
    async fn upload(&self, doc_id: &str, text: &str) -> Result<()> {
        self.upload_text(doc_id, text).await
    }
}

/// Stable document id for a page, derived from its URL
///
/// Also used as the per-job output directory name, so it must stay
/// filesystem-safe regardless of what the URL contains.
pub fn page_doc_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("page_{}", &hex::encode(hasher.finalize())[..16])
}

/// Assemble the combined document handed to the knowledge base
///
/// Page text first, then the extracted datasheet content when a job produced
/// one, under a small header identifying the source.
pub fn build_document(page: &Page, page_text: &str, extraction: Option<&ExtractedOutput>) -> String {
    let mut doc = String::new();

    let title = page.title.as_deref().unwrap_or("Untitled");
    doc.push_str(&format!("# {}\n\n", title));
    doc.push_str(&format!("Source: {}\n", page.url));
    if let Some(category) = &page.category {
        match &page.subcategory {
            Some(sub) => doc.push_str(&format!("Category: {} / {}\n", category, sub)),
            None => doc.push_str(&format!("Category: {}\n", category)),
        }
    }

    doc.push_str("\n## Page Content\n\n");
    doc.push_str(page_text);
    doc.push('\n');

    if let Some(output) = extraction {
        doc.push_str("\n## Datasheet Content\n\n");
        doc.push_str(output.text.trim_end());
        doc.push('\n');
    }

    doc
}
