//! Per-page processing: scrape, download, spawn extraction
//!
//! The processor only starts work. Pages with a datasheet become a spawned
//! extraction job resolved later by the completion poller; pages without one
//! are returned inline, ready for direct handoff.

use crate::db::models::Page;
use crate::db::{datasheets, DbPool};
use crate::error::Result;
use crate::extract::options::ExtractorOptions;
use crate::extract::spawner::{spawn_extraction, ExtractJob};
use crate::ingest::page_doc_id;
use crate::scrape::PageScraper;
use crate::worker::config::WorkerConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// What processing a page amounted to
pub enum ProcessStart {
    /// Extraction subprocess launched; the poller owns it now
    Spawned(ExtractJob),
    /// No datasheet; scraped text is ready for direct handoff
    Inline { page: Page, text: String },
}

/// Starts processing for claimed pages
pub struct PageProcessor {
    scraper: PageScraper,
    options: ExtractorOptions,
    output_dir: PathBuf,
    job_timeout: Duration,
}

impl PageProcessor {
    pub fn new(config: &WorkerConfig, options: ExtractorOptions) -> Result<Self> {
        Ok(Self {
            scraper: PageScraper::new()?,
            options,
            output_dir: config.output_dir.clone(),
            job_timeout: config.job_timeout,
        })
    }

    /// Scrape a claimed page and, when it has a datasheet, start extraction
    ///
    /// Only the first datasheet is extracted; a page never has more than one
    /// job in flight.
    pub async fn start(&self, pool: &DbPool, page: Page) -> Result<ProcessStart> {
        let scraped = self.scraper.scrape(&page.url).await?;
        info!(
            "Scraped page {}: \"{}\" ({} chars)",
            page.id,
            scraped.title,
            scraped.text.len()
        );

        let sheets = datasheets::list_for_page(pool, &page.url).await?;
        let sheet = match sheets.first() {
            Some(sheet) => sheet.clone(),
            None => {
                return Ok(ProcessStart::Inline {
                    page,
                    text: scraped.text,
                })
            }
        };
        if sheets.len() > 1 {
            warn!(
                "Page {} has {} datasheets, extracting only the first",
                page.id,
                sheets.len()
            );
        }

        let doc_id = page_doc_id(&page.url);
        let job_dir = self.output_dir.join(&doc_id);
        tokio::fs::create_dir_all(&job_dir).await?;

        let pdf_path = job_dir.join(pdf_filename(&sheet.url, &doc_id));
        self.scraper.download(&sheet.url, &pdf_path).await?;

        let job = spawn_extraction(
            &self.options,
            page,
            scraped.text,
            &pdf_path,
            &job_dir,
            self.job_timeout,
        )?;

        Ok(ProcessStart::Spawned(job))
    }
}

/// Derive a filesystem-safe local filename for a datasheet URL
///
/// Falls back to the page's document id when the URL has no usable last
/// segment. The `.pdf` suffix is enforced so the output stem stays stable.
fn pdf_filename(url: &str, fallback_stem: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|s| s.last().map(|n| n.to_string()))
        })
        .filter(|n| !n.is_empty());

    let name = match segment {
        Some(n) => n
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>(),
        None => format!("{fallback_stem}.pdf"),
    };

    if name.to_ascii_lowercase().ends_with(".pdf") {
        name
    } else {
        format!("{name}.pdf")
    }
}
