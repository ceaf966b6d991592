//! Backlog queries for the `pages` table
//!
//! Claiming is a single-row conditional UPDATE: the database evaluates the
//! precondition and applies the write atomically per row, so of any number of
//! workers racing on the same page exactly one sees `rows_affected() == 1`.

use crate::db::models::{BacklogStatus, Page};
use crate::db::DbPool;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

/// Fetch unprocessed pages eligible for claiming
///
/// Returns pages that are not yet ingested and either unlocked or holding an
/// expired lease. Callers oversample and shuffle before claiming, so the
/// stable `ORDER BY id` here is fine.
pub async fn fetch_unprocessed(
    pool: &DbPool,
    subcategory: Option<&str>,
    limit: i64,
) -> Result<Vec<Page>> {
    let pages = match subcategory {
        Some(sub) => {
            sqlx::query_as::<_, Page>(
                r#"
                SELECT * FROM pages
                WHERE rag_ingested = FALSE
                  AND (processing_locked = FALSE OR lease_expires_at < NOW())
                  AND subcategory = $1
                ORDER BY id ASC
                LIMIT $2
                "#,
            )
            .bind(sub)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Page>(
                r#"
                SELECT * FROM pages
                WHERE rag_ingested = FALSE
                  AND (processing_locked = FALSE OR lease_expires_at < NOW())
                ORDER BY id ASC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(pages)
}

/// Attempt to claim a page for exclusive processing
///
/// Succeeds iff the page is unlocked or its previous lease has expired.
/// Returns true when this worker won the claim.
pub async fn try_claim(
    pool: &DbPool,
    page_id: i64,
    worker_id: &str,
    lease_expires_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pages
        SET processing_locked = TRUE,
            processing_worker = $2,
            lease_expires_at = $3,
            updated_at = NOW()
        WHERE id = $1
          AND (processing_locked = FALSE OR lease_expires_at < NOW())
        "#,
    )
    .bind(page_id)
    .bind(worker_id)
    .bind(lease_expires_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release a page claim unconditionally
///
/// Idempotent: releasing an already-unlocked page is a no-op.
pub async fn release(pool: &DbPool, page_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pages
        SET processing_locked = FALSE,
            processing_worker = NULL,
            lease_expires_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(page_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Push out the lease on a page this worker still holds
///
/// The precondition on `processing_worker` means a refresh after another
/// worker claimed an expired lease is a silent no-op rather than a theft.
pub async fn extend_lease(
    pool: &DbPool,
    page_id: i64,
    worker_id: &str,
    lease_expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pages
        SET lease_expires_at = $3,
            updated_at = NOW()
        WHERE id = $1
          AND processing_locked = TRUE
          AND processing_worker = $2
        "#,
    )
    .bind(page_id)
    .bind(worker_id)
    .bind(lease_expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a page as ingested into the knowledge base
pub async fn mark_ingested(pool: &DbPool, page_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pages
        SET rag_ingested = TRUE,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(page_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a page by ID
pub async fn get_page_by_id(pool: &DbPool, page_id: i64) -> Result<Option<Page>> {
    let page = sqlx::query_as::<_, Page>("SELECT * FROM pages WHERE id = $1")
        .bind(page_id)
        .fetch_optional(pool)
        .await?;

    Ok(page)
}

/// Count total and ingested pages for status reporting
pub async fn backlog_status(pool: &DbPool, subcategory: Option<&str>) -> Result<BacklogStatus> {
    let row = match subcategory {
        Some(sub) => {
            sqlx::query(
                r#"
                SELECT COUNT(*) AS total,
                       COUNT(*) FILTER (WHERE rag_ingested) AS processed
                FROM pages
                WHERE subcategory = $1
                "#,
            )
            .bind(sub)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT COUNT(*) AS total,
                       COUNT(*) FILTER (WHERE rag_ingested) AS processed
                FROM pages
                "#,
            )
            .fetch_one(pool)
            .await?
        }
    };

    let total: i64 = row.get("total");
    let processed: i64 = row.get("processed");

    Ok(BacklogStatus {
        total,
        processed,
        remaining: total - processed,
    })
}
