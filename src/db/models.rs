//! Database models for the pages backlog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Page - matches the `pages` backlog table
///
/// `processing_locked`/`processing_worker` form the claim; `lease_expires_at`
/// bounds how long a claim survives a crashed worker. `rag_ingested` is the
/// terminal processed flag, set only after a successful knowledge-base upload.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub processing_locked: bool,
    pub processing_worker: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub rag_ingested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Datasheet - a PDF document attached to a page, matches the `datasheets` table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Datasheet {
    pub id: i64,
    pub parent_url: String,
    pub url: String,
    pub title: Option<String>,
}

/// Aggregate backlog progress for status reporting
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BacklogStatus {
    pub total: i64,
    pub processed: i64,
    pub remaining: i64,
}
