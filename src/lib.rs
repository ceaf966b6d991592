//! RAG Ingest - a worker service feeding a knowledge base from a shared backlog
//!
//! Pages live in a shared Postgres backlog. Any number of independent worker
//! processes race over it: each claims a batch via conditional updates,
//! scrapes the page, downloads its PDF datasheet, runs an external extraction
//! tool against it, and uploads the combined text to a LightRAG-compatible
//! server. A single background poller per worker resolves the long-running
//! extraction subprocesses, including timeout termination and output salvage.
//!
//! Cross-worker exclusion relies entirely on single-row optimistic updates -
//! no lock service, no transactions spanning pages. Claims carry a lease so
//! a crashed worker's pages become claimable again once it expires.

pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod scrape;
pub mod worker;

pub use error::{IngestError, Result};
pub use extract::{ExtractMode, ExtractorOptions, ExtractionCoordinator};
pub use ingest::{build_document, page_doc_id, IngestClient, ResultHandoff};
pub use scrape::{PageScraper, ScrapeConfig, ScrapedPage};
pub use worker::{BatchRunner, ClaimManager, PageProcessor, WorkerConfig};
