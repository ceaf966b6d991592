//! Worker module for claiming and processing backlog pages
//!
//! This module provides:
//! - BatchRunner: Main worker loop (claim, spawn, await, summarize)
//! - ClaimManager: Optimistic claims against the shared backlog
//! - PageProcessor: Per-page scrape / download / spawn pipeline
//! - WorkerConfig: Configuration for the worker
//! - BatchStats: Counters shared with the completion poller

pub mod batch;
pub mod claim;
pub mod config;
pub mod processor;
pub mod stats;

pub use batch::{setup_signal_handler, BatchRunner};
pub use claim::{ClaimManager, ClaimOutcome};
pub use config::WorkerConfig;
pub use processor::{PageProcessor, ProcessStart};
pub use stats::{BatchStats, StatsSnapshot};
