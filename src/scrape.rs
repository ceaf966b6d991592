//! Page scraping and document download
//!
//! Fetches a work item's page, reduces it to clean ingestible text, and
//! downloads attached PDF documents. Retries with exponential backoff; 4xx
//! responses other than 429 are not retried.

use crate::error::{IngestError, Result};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for the page scraper
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Connection timeout (default: 10 seconds)
    pub connect_timeout: Duration,
    /// Request timeout for page fetches (default: 30 seconds)
    pub request_timeout: Duration,
    /// Request timeout for document downloads (default: 300 seconds)
    pub download_timeout: Duration,
    /// Maximum number of retry attempts (default: 3)
    pub max_retries: u32,
    /// Initial delay between retries, doubles each attempt (default: 1 second)
    pub retry_base_delay: Duration,
    /// Maximum delay between retries (default: 10 seconds)
    pub retry_max_delay: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
        }
    }
}

/// Scraped page reduced to title and clean text
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub title: String,
    pub text: String,
}

/// HTTP scraper shared by page fetches and PDF downloads
pub struct PageScraper {
    client: Client,
    config: ScrapeConfig,
}

impl PageScraper {
    /// Create a new scraper with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ScrapeConfig::default())
    }

    /// Create a new scraper with custom configuration
    pub fn with_config(config: ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .connect_timeout(config.connect_timeout)
            .timeout(config.download_timeout)
            .build()
            .map_err(|e| IngestError::FetchError {
                url: "client_init".to_string(),
                source: e,
            })?;

        Ok(Self { client, config })
    }

    /// Fetch a page and reduce it to clean text
    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        let html = self.fetch(url).await?;
        Ok(parse_page(&html))
    }

    /// Fetch a URL and return the response body with retry support
    pub async fn fetch(&self, url: &str) -> Result<String> {
        info!("Fetching URL: {}", url);

        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = std::cmp::min(
                    self.config.retry_base_delay * 2u32.saturating_pow(attempt - 1),
                    self.config.retry_max_delay,
                );
                warn!(
                    "Retry attempt {}/{} for {} after {:?}",
                    attempt, self.config.max_retries, url, delay
                );
                sleep(delay).await;
            }

            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Fetch attempt {} failed for {}: {}", attempt + 1, url, last_error);

                    // Client errors (4xx) are permanent, except rate limits
                    if let IngestError::HttpStatusError { status, .. } = &e {
                        if (400..500).contains(status) && *status != 429 {
                            return Err(e);
                        }
                    }
                }
            }
        }

        Err(IngestError::RetryExhausted {
            url: url.to_string(),
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }

    /// Download a binary document (PDF) to the given path
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading document: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| IngestError::FetchError {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatusError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| IngestError::FetchError {
            url: url.to_string(),
            source: e,
        })?;

        tokio::fs::write(dest, &bytes).await?;
        debug!("Saved {} bytes to {}", bytes.len(), dest.display());

        Ok(())
    }

    /// Single fetch attempt without retry
    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| IngestError::FetchError {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatusError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| IngestError::FetchError {
            url: url.to_string(),
            source: e,
        })?;

        Ok(body)
    }
}

/// Parse HTML into a title and whitespace-normalized body text
///
/// Script and style contents are dropped before text extraction.
pub fn parse_page(html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").unwrap();
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_else(|| "Untitled".to_string());

    let body_selector = Selector::parse("body").unwrap();
    let skip_selector = Selector::parse("script, style, noscript").unwrap();

    let mut raw = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        // Text nodes inside script/style carry no prose; collect the rest
        let skipped: Vec<_> = body.select(&skip_selector).map(|el| el.id()).collect();
        for node in body.descendants() {
            if let Some(text) = node.value().as_text() {
                let in_skipped = node
                    .ancestors()
                    .any(|a| skipped.contains(&a.id()));
                if !in_skipped {
                    raw.push_str(text);
                    raw.push(' ');
                }
            }
        }
    }

    ScrapedPage {
        title,
        text: clean_text(&raw),
    }
}

/// Collapse runs of whitespace into single spaces
pub fn clean_text(raw: &str) -> String {
    let ws = Regex::new(r"\s+").unwrap();
    ws.replace_all(raw.trim(), " ").into_owned()
}
