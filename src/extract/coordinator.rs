//! Job registry and completion poller
//!
//! One coordinator per worker process owns every in-flight extraction job.
//! A single background task sweeps the registry on a fixed interval and is
//! the only code that removes entries, so each job reaches exactly one
//! terminal outcome: handoff on success, claim release on every path.
//!
//! The registry is local to this process. Cross-worker exclusion lives in
//! the backlog's conditional updates, never here.

use crate::db::{pages, DbPool};
use crate::error::IngestError;
use crate::extract::artifacts::{find_output, ExtractedOutput};
use crate::extract::spawner::ExtractJob;
use crate::ingest::{build_document, page_doc_id, ResultHandoff};
use crate::worker::stats::BatchStats;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Timing knobs for the completion poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between sweeps while jobs are active (default: 30 seconds)
    pub poll_interval: Duration,
    /// Sleep while the registry is empty (default: 60 seconds)
    pub idle_interval: Duration,
    /// Grace period between SIGTERM and SIGKILL on timeout (default: 5 seconds)
    pub kill_grace: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            idle_interval: Duration::from_secs(60),
            kill_grace: Duration::from_secs(5),
        }
    }
}

/// Why a job left the registry during a sweep
enum ExitKind {
    Exited(ExitStatus),
    TimedOut,
    WaitFailed(String),
}

/// Terminal result of one job, decided after the artifact check
enum JobResolution {
    Success { output: ExtractedOutput, salvaged: bool },
    Failure(IngestError),
}

/// Owns active extraction jobs and resolves them to terminal outcomes
pub struct ExtractionCoordinator {
    jobs: Mutex<HashMap<Uuid, ExtractJob>>,
    pool: DbPool,
    handoff: Arc<dyn ResultHandoff>,
    config: PollerConfig,
    worker_id: String,
    lease_duration: Duration,
    stats: Arc<BatchStats>,
}

impl ExtractionCoordinator {
    pub fn new(
        pool: DbPool,
        handoff: Arc<dyn ResultHandoff>,
        config: PollerConfig,
        worker_id: String,
        lease_duration: Duration,
        stats: Arc<BatchStats>,
    ) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            pool,
            handoff,
            config,
            worker_id,
            lease_duration,
            stats,
        }
    }

    /// Hand a freshly spawned job to the poller
    pub async fn register(&self, job: ExtractJob) {
        debug!("Registering job {} for page {}", job.id, job.page.id);
        self.jobs.lock().await.insert(job.id, job);
    }

    /// Number of jobs not yet resolved
    pub async fn active_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Block until every registered job has been resolved
    pub async fn wait_for_drain(&self) {
        let check = std::cmp::min(self.config.poll_interval, Duration::from_secs(1));
        while self.active_count().await > 0 {
            sleep(check).await;
        }
    }

    /// Spawn the background polling loop
    ///
    /// The loop keeps sweeping while jobs are active even after shutdown is
    /// signalled, so in-flight extractions still resolve; it exits once the
    /// registry is empty and shutdown is set.
    pub fn start(self: &Arc<Self>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                "Completion poller started (interval {:?}, idle {:?})",
                poller.config.poll_interval, poller.config.idle_interval
            );
            loop {
                let active = poller.active_count().await;
                if active == 0 {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    sleep(poller.config.idle_interval).await;
                    continue;
                }
                debug!("Polling {} active extraction job(s)", active);
                poller.tick().await;
                sleep(poller.config.poll_interval).await;
            }
            info!("Completion poller stopped");
        })
    }

    /// One sweep over the registry
    async fn tick(&self) {
        // Phase 1: non-blocking status checks under the lock. Terminal jobs
        // are removed here; resolution happens after the lock is dropped so
        // slow handoffs never stall `register`.
        let mut finished: Vec<(ExtractJob, ExitKind)> = Vec::new();
        let mut still_running: Vec<i64> = Vec::new();
        {
            let mut jobs = self.jobs.lock().await;
            let ids: Vec<Uuid> = jobs.keys().copied().collect();
            for id in ids {
                let status = match jobs.get_mut(&id) {
                    Some(job) => job.child.try_wait(),
                    None => continue,
                };
                match status {
                    Ok(Some(exit)) => {
                        if let Some(job) = jobs.remove(&id) {
                            finished.push((job, ExitKind::Exited(exit)));
                        }
                    }
                    Ok(None) => {
                        let timed_out = jobs.get(&id).map(|j| j.timed_out()).unwrap_or(false);
                        if timed_out {
                            if let Some(job) = jobs.remove(&id) {
                                finished.push((job, ExitKind::TimedOut));
                            }
                        } else if let Some(job) = jobs.get(&id) {
                            still_running.push(job.page.id);
                        }
                    }
                    Err(e) => {
                        warn!("try_wait failed for job {}: {}", id, e);
                        if let Some(job) = jobs.remove(&id) {
                            finished.push((job, ExitKind::WaitFailed(e.to_string())));
                        }
                    }
                }
            }
        }

        // Phase 2: resolve terminal jobs
        for (mut job, kind) in finished {
            let resolution = match kind {
                ExitKind::Exited(exit) => self.resolve_exited(&job, exit),
                ExitKind::WaitFailed(reason) => {
                    JobResolution::Failure(IngestError::ExtractionFailed(reason))
                }
                ExitKind::TimedOut => {
                    warn!(
                        "Job {} for page {} exceeded timeout ({:?}), terminating",
                        job.id, job.page.id, job.timeout
                    );
                    job.terminate(self.config.kill_grace).await;
                    self.resolve_timed_out(&job)
                }
            };
            self.finalize(job, resolution).await;
        }

        // Phase 3: keep leases ahead of running jobs
        for page_id in still_running {
            if let Err(e) =
                pages::extend_lease(&self.pool, page_id, &self.worker_id, self.lease_deadline())
                    .await
            {
                warn!("Failed to extend lease on page {}: {}", page_id, e);
            }
        }
    }

    /// Decide the outcome of a job whose process exited on its own
    ///
    /// The artifact check runs regardless of exit code; the tool is known to
    /// report failure despite writing usable output.
    fn resolve_exited(&self, job: &ExtractJob, exit: ExitStatus) -> JobResolution {
        match find_output(&job.output_dir, &job.doc_stem) {
            Ok(Some(output)) => {
                if !exit.success() {
                    warn!(
                        "Job {} exited with {} but left usable artifacts, treating as success",
                        job.id, exit
                    );
                }
                JobResolution::Success {
                    output,
                    salvaged: false,
                }
            }
            Ok(None) => JobResolution::Failure(IngestError::ExtractionFailed(format!(
                "{}, no usable artifacts",
                exit
            ))),
            Err(e) => JobResolution::Failure(IngestError::ExtractionFailed(format!(
                "artifact check failed: {}",
                e
            ))),
        }
    }

    /// Salvage check after a timeout termination
    fn resolve_timed_out(&self, job: &ExtractJob) -> JobResolution {
        match find_output(&job.output_dir, &job.doc_stem) {
            Ok(Some(output)) => JobResolution::Success {
                output,
                salvaged: true,
            },
            _ => JobResolution::Failure(IngestError::ExtractionTimeout {
                elapsed_secs: job.elapsed().as_secs(),
            }),
        }
    }

    /// Hand off, update the processed flag, release the claim, count
    async fn finalize(&self, job: ExtractJob, resolution: JobResolution) {
        let page_id = job.page.id;

        match resolution {
            JobResolution::Success { output, salvaged } => {
                let doc_id = page_doc_id(&job.page.url);
                let document = build_document(&job.page, &job.page_text, Some(&output));
                match self.handoff.upload(&doc_id, &document).await {
                    Ok(()) => {
                        if let Err(e) = pages::mark_ingested(&self.pool, page_id).await {
                            error!("Failed to mark page {} ingested: {}", page_id, e);
                        }
                        self.stats.record_success();
                        info!(
                            "Job {} for page {} succeeded{}",
                            job.id,
                            page_id,
                            if salvaged { " (timeout-salvage)" } else { "" }
                        );
                    }
                    Err(e) => {
                        // Page stays un-ingested; the released claim leaves it
                        // eligible for a later pass
                        error!("Handoff failed for page {}: {}", page_id, e);
                        self.stats.record_failure();
                    }
                }
            }
            JobResolution::Failure(reason) => {
                error!("Job {} for page {} failed: {}", job.id, page_id, reason);
                self.stats.record_failure();
            }
        }

        if let Err(e) = pages::release(&self.pool, page_id).await {
            error!("Failed to release claim on page {}: {}", page_id, e);
        }
    }

    fn lease_deadline(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(self.lease_duration.as_secs() as i64)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::db::models::Page;
    use crate::error::{IngestError, Result};
    use crate::extract::options::ExtractorOptions;
    use crate::extract::spawner::spawn_extraction;
    use async_trait::async_trait;
    use sqlx::postgres::PgPoolOptions;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Records uploads; optionally rejects them
    struct StubHandoff {
        uploads: std::sync::Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl StubHandoff {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                uploads: std::sync::Mutex::new(Vec::new()),
                fail,
            })
        }

        fn upload_count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ResultHandoff for StubHandoff {
        async fn upload(&self, doc_id: &str, text: &str) -> Result<()> {
            self.uploads
                .lock()
                .unwrap()
                .push((doc_id.to_string(), text.to_string()));
            if self.fail {
                return Err(IngestError::HandoffRejected {
                    doc_id: doc_id.to_string(),
                    message: "stub rejection".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Pool that never connects; db side effects fail fast and are logged
    fn lazy_pool() -> DbPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(50))
            .connect_lazy("postgres://127.0.0.1:1/unreachable")
            .unwrap()
    }

    fn fast_config() -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_millis(50),
            idle_interval: Duration::from_millis(100),
            kill_grace: Duration::from_millis(100),
        }
    }

    fn coordinator(handoff: Arc<dyn ResultHandoff>) -> (Arc<ExtractionCoordinator>, Arc<BatchStats>) {
        let stats = Arc::new(BatchStats::default());
        let coordinator = Arc::new(ExtractionCoordinator::new(
            lazy_pool(),
            handoff,
            fast_config(),
            "test-worker".to_string(),
            Duration::from_secs(60),
            Arc::clone(&stats),
        ));
        (coordinator, stats)
    }

    fn test_page(id: i64) -> Page {
        Page {
            id,
            url: format!("https://example.com/p/{id}"),
            title: Some("Test".to_string()),
            category: None,
            subcategory: None,
            processing_locked: true,
            processing_worker: Some("test-worker".to_string()),
            lease_expires_at: None,
            rag_ingested: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Stub extraction tool: writes artifacts per `body`, exits per `exit`
    fn write_stub(dir: &Path, body: &str) -> std::path::PathBuf {
        let stub = dir.join("stub.sh");
        std::fs::write(&stub, body).unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
        stub
    }

    const WRITE_ARTIFACTS: &str = r#"
in="$2"; out="$4"
stem=$(basename "$in"); stem="${stem%.*}"
mkdir -p "$out/$stem/auto"
printf '# Extracted doc\n' > "$out/$stem/auto/$stem.md"
printf '[]' > "$out/$stem/auto/${stem}_content_list.json"
"#;

    fn spawn_stub(
        dir: &Path,
        script: &str,
        page_id: i64,
        timeout: Duration,
    ) -> crate::extract::spawner::ExtractJob {
        let stub = write_stub(dir, script);
        let options = ExtractorOptions {
            program: stub,
            ..Default::default()
        };
        spawn_extraction(
            &options,
            test_page(page_id),
            "Scraped page text.".to_string(),
            &dir.join("doc.pdf"),
            dir,
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_clean_completion_is_detected_and_handed_off() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("#!/bin/sh{WRITE_ARTIFACTS}exit 0\n");
        let handoff = StubHandoff::new(false);
        let (coordinator, stats) = coordinator(handoff.clone());

        let job = spawn_stub(dir.path(), &script, 1, Duration::from_secs(30));
        coordinator.register(job).await;

        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        coordinator.wait_for_drain().await;
        let snap = stats.snapshot();
        assert_eq!(snap.success, 1);
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.failed, 0);

        let uploads = handoff.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].0.starts_with("page_"));
        assert!(uploads[0].1.contains("## Page Content"));
        assert!(uploads[0].1.contains("# Extracted doc"));
        drop(uploads);

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_artifacts_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("#!/bin/sh{WRITE_ARTIFACTS}exit 2\n");
        let handoff = StubHandoff::new(false);
        let (coordinator, stats) = coordinator(handoff.clone());

        coordinator
            .register(spawn_stub(dir.path(), &script, 2, Duration::from_secs(30)))
            .await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        coordinator.wait_for_drain().await;
        assert_eq!(stats.snapshot().success, 1);
        assert_eq!(handoff.upload_count(), 1);

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }

    #[tokio::test]
    async fn test_exit_without_artifacts_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = StubHandoff::new(false);
        let (coordinator, stats) = coordinator(handoff.clone());

        coordinator
            .register(spawn_stub(dir.path(), "#!/bin/sh\nexit 3\n", 3, Duration::from_secs(30)))
            .await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        coordinator.wait_for_drain().await;
        let snap = stats.snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.success, 0);
        assert_eq!(handoff.upload_count(), 0);

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }

    #[tokio::test]
    async fn test_timeout_with_artifacts_is_salvaged() {
        let dir = tempfile::tempdir().unwrap();
        // Writes artifacts, then hangs past any timeout
        let script = format!("#!/bin/sh{WRITE_ARTIFACTS}sleep 600\n");
        let handoff = StubHandoff::new(false);
        let (coordinator, stats) = coordinator(handoff.clone());

        coordinator
            .register(spawn_stub(dir.path(), &script, 4, Duration::from_millis(200)))
            .await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        coordinator.wait_for_drain().await;
        let snap = stats.snapshot();
        assert_eq!(snap.success, 1, "salvaged output should count as success");
        assert_eq!(snap.failed, 0);
        assert_eq!(handoff.upload_count(), 1);

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }

    #[tokio::test]
    async fn test_timeout_without_artifacts_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = StubHandoff::new(false);
        let (coordinator, stats) = coordinator(handoff.clone());

        coordinator
            .register(spawn_stub(
                dir.path(),
                "#!/bin/sh\nsleep 600\n",
                5,
                Duration::from_millis(200),
            ))
            .await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        coordinator.wait_for_drain().await;
        let snap = stats.snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.success, 0);
        assert_eq!(handoff.upload_count(), 0);

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }

    #[tokio::test]
    async fn test_externally_killed_job_is_failure_and_registry_drains() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = StubHandoff::new(false);
        let (coordinator, stats) = coordinator(handoff.clone());

        let job = spawn_stub(
            dir.path(),
            "#!/bin/sh\nsleep 600\n",
            6,
            Duration::from_secs(600),
        );
        let pid = job.child.id().unwrap();
        coordinator.register(job).await;

        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        // Kill out from under the poller, as an OOM killer or operator would
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }

        coordinator.wait_for_drain().await;
        assert_eq!(stats.snapshot().failed, 1);
        assert_eq!(coordinator.active_count().await, 0);

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }

    #[tokio::test]
    async fn test_handoff_rejection_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("#!/bin/sh{WRITE_ARTIFACTS}exit 0\n");
        let handoff = StubHandoff::new(true);
        let (coordinator, stats) = coordinator(handoff.clone());

        coordinator
            .register(spawn_stub(dir.path(), &script, 7, Duration::from_secs(30)))
            .await;
        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        coordinator.wait_for_drain().await;
        let snap = stats.snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.success, 0);
        assert_eq!(handoff.upload_count(), 1, "rejected upload was still attempted");

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }

    #[tokio::test]
    async fn test_job_registered_after_idle_period_still_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!("#!/bin/sh{WRITE_ARTIFACTS}exit 0\n");
        let handoff = StubHandoff::new(false);
        let (coordinator, stats) = coordinator(handoff.clone());

        let shutdown = Arc::new(AtomicBool::new(false));
        let poller = coordinator.start(shutdown.clone());

        // Let the poller settle into idle backoff first
        sleep(Duration::from_millis(250)).await;
        coordinator
            .register(spawn_stub(dir.path(), &script, 8, Duration::from_secs(30)))
            .await;

        coordinator.wait_for_drain().await;
        assert_eq!(stats.snapshot().success, 1);

        shutdown.store(true, Ordering::Relaxed);
        let _ = poller.await;
    }
}
