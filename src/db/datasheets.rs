//! Queries for the `datasheets` table
//!
//! Datasheets are keyed by their parent page URL, mirroring how the scrape
//! pipeline records them.

use crate::db::models::Datasheet;
use crate::db::DbPool;
use crate::error::Result;
use sqlx::Row;

/// List datasheets attached to a page, oldest first
pub async fn list_for_page(pool: &DbPool, parent_url: &str) -> Result<Vec<Datasheet>> {
    let sheets = sqlx::query_as::<_, Datasheet>(
        r#"
        SELECT * FROM datasheets
        WHERE parent_url = $1
        ORDER BY id ASC
        "#,
    )
    .bind(parent_url)
    .fetch_all(pool)
    .await?;

    Ok(sheets)
}

/// Count datasheets attached to a page
pub async fn count_for_page(pool: &DbPool, parent_url: &str) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM datasheets WHERE parent_url = $1")
        .bind(parent_url)
        .fetch_one(pool)
        .await?;

    Ok(row.get("count"))
}

#[cfg(test)]
mod tests {
    // Requires a running database - see integration tests
}
