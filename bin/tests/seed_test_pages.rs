//! Seed test pages (and one datasheet) for exercising the ingest worker
//!
//! Usage: cargo run --bin seed_test_pages

use rag_ingest::db::create_pool_from_env;
use sqlx::Row;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env
    dotenvy::dotenv().ok();

    println!("Connecting to database...");
    let pool = create_pool_from_env().await?;
    println!("✓ Connected to database");

    let test_url = format!("https://example.com/test-page-{}", uuid::Uuid::new_v4());
    println!("\nCreating test page: {}", test_url);

    let row = sqlx::query(
        r#"
        INSERT INTO pages (url, title, category, subcategory,
                           processing_locked, rag_ingested, created_at, updated_at)
        VALUES ($1, 'Seeded test page', 'test', 'seeded', FALSE, FALSE, NOW(), NOW())
        RETURNING id
        "#,
    )
    .bind(&test_url)
    .fetch_one(&pool)
    .await?;

    let page_id: i64 = row.get("id");
    println!("✓ Created page with id: {}", page_id);

    sqlx::query(
        r#"
        INSERT INTO datasheets (parent_url, url, title)
        VALUES ($1, $2, 'Seeded test datasheet')
        "#,
    )
    .bind(&test_url)
    .bind(format!("{}/datasheet.pdf", test_url))
    .execute(&pool)
    .await?;
    println!("✓ Attached one datasheet");

    println!("\nRun the worker to pick it up:");
    println!("  cargo run -- worker --subcategory seeded --once");

    Ok(())
}
