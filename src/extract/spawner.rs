//! Non-blocking launch of extraction jobs
//!
//! `spawn_extraction` returns as soon as the subprocess is started; the
//! coordinator polls it to completion. Launch failures (missing binary, bad
//! permissions) surface synchronously as `SpawnFailure` with no retry.

use crate::db::models::Page;
use crate::error::{IngestError, Result};
use crate::extract::options::ExtractorOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Child;
use tracing::{debug, info};
use uuid::Uuid;

/// One in-flight extraction job and everything needed to resolve it
#[derive(Debug)]
pub struct ExtractJob {
    pub id: Uuid,
    /// The claimed page this job belongs to
    pub page: Page,
    /// Scraped page text, carried along for the combined handoff document
    pub page_text: String,
    pub child: Child,
    pub started_at: Instant,
    pub timeout: Duration,
    pub output_dir: PathBuf,
    /// Input file stem; the tool names its output directory after it
    pub doc_stem: String,
}

impl ExtractJob {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn timed_out(&self) -> bool {
        self.elapsed() > self.timeout
    }

    /// Terminate the subprocess: SIGTERM, a grace period, then SIGKILL
    ///
    /// Uses `libc::kill` directly rather than shelling out. After this
    /// returns the process is gone and reaped; output artifacts it managed
    /// to write are still on disk for the salvage check.
    pub async fn terminate(&mut self, grace: Duration) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: pid comes from our own Child and the caller saw it
                // still running this tick, so reuse risk is minimal.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
                tokio::time::sleep(grace).await;
            }
        }
        #[cfg(not(unix))]
        let _ = grace;

        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill().await;
        }
    }
}

/// Launch the extraction tool for one document without waiting
pub fn spawn_extraction(
    options: &ExtractorOptions,
    page: Page,
    page_text: String,
    input: &Path,
    output_dir: &Path,
    timeout: Duration,
) -> Result<ExtractJob> {
    let doc_stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| IngestError::SpawnFailure(format!("no file stem: {}", input.display())))?;

    let mut cmd = options.command(input, output_dir);
    debug!("Extraction command: {:?}", cmd.as_std());

    let child = cmd.spawn().map_err(|e| {
        IngestError::SpawnFailure(format!("{}: {}", options.program.display(), e))
    })?;

    let id = Uuid::new_v4();
    info!(
        "Spawned extraction job {} for page {} (pid {:?}, timeout {:?})",
        id,
        page.id,
        child.id(),
        timeout
    );

    Ok(ExtractJob {
        id,
        page,
        page_text,
        child,
        started_at: Instant::now(),
        timeout,
        output_dir: output_dir.to_path_buf(),
        doc_stem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::options::ExtractorOptions;
    use chrono::Utc;

    fn test_page() -> Page {
        Page {
            id: 1,
            url: "https://example.com/p/1".to_string(),
            title: Some("Test".to_string()),
            category: None,
            subcategory: None,
            processing_locked: true,
            processing_worker: Some("test".to_string()),
            lease_expires_at: None,
            rag_ingested: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_on_missing_binary() {
        let options = ExtractorOptions {
            program: "/nonexistent/extraction-tool".into(),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();

        let result = spawn_extraction(
            &options,
            test_page(),
            String::new(),
            &dir.path().join("doc.pdf"),
            dir.path(),
            Duration::from_secs(1),
        );

        assert!(matches!(result, Err(IngestError::SpawnFailure(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_kills_running_job() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("stub.sh");
        std::fs::write(&stub, "#!/bin/sh\nsleep 600\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let options = ExtractorOptions {
            program: stub,
            ..Default::default()
        };

        let mut job = spawn_extraction(
            &options,
            test_page(),
            String::new(),
            &dir.path().join("doc.pdf"),
            dir.path(),
            Duration::from_millis(10),
        )
        .unwrap();

        job.terminate(Duration::from_millis(100)).await;
        let status = job.child.try_wait().unwrap();
        assert!(status.is_some(), "process should be reaped after terminate");
    }
}
