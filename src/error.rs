//! Error types for the ingest worker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to fetch URL: {url}")]
    FetchError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for URL: {url}")]
    HttpStatusError { url: String, status: u16 },

    #[error("Failed to fetch URL after {attempts} attempts: {url} (last error: {last_error})")]
    RetryExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Failed to launch extraction tool: {0}")]
    SpawnFailure(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Extraction timed out after {elapsed_secs}s with no salvageable output")]
    ExtractionTimeout { elapsed_secs: u64 },

    #[error("Knowledge base rejected document {doc_id}: {message}")]
    HandoffRejected { doc_id: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Page {0} is already claimed by another worker")]
    PageBusy(i64),

    #[error("Page {0} not found in the backlog")]
    PageNotFound(i64),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("File system error")]
    FsError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
