//! Worker configuration

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker identity, used as claim owner and log prefix
    pub worker_id: String,

    /// Pages claimed per batch
    pub batch_size: usize,

    /// Candidate multiplier for oversampled backlog reads
    pub oversample_factor: usize,

    /// Restrict candidate selection to one subcategory
    pub subcategory: Option<String>,

    /// Only take pages with exactly this many datasheets
    pub datasheet_count: Option<i64>,

    /// Poll interval for the completion poller, and the sleep between
    /// batches when the backlog is empty
    pub poll_interval: Duration,

    /// Poller sleep while no jobs are registered
    pub idle_interval: Duration,

    /// Per-job extraction timeout
    pub job_timeout: Duration,

    /// Grace period between SIGTERM and SIGKILL when a job times out
    pub kill_grace: Duration,

    /// Delay between job spawns, bounding extraction tool load
    pub spawn_delay: Duration,

    /// How long a claim survives without a lease refresh
    pub lease_duration: Duration,

    /// Root directory for per-job extraction output
    pub output_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", std::process::id()),
            batch_size: 10,
            oversample_factor: 5,
            subcategory: None,
            datasheet_count: None,
            poll_interval: Duration::from_secs(30),
            idle_interval: Duration::from_secs(60),
            job_timeout: Duration::from_secs(1200), // 20 minutes
            kill_grace: Duration::from_secs(5),
            spawn_delay: Duration::from_secs(1),
            lease_duration: Duration::from_secs(600),
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set the worker identity
    pub fn worker_id(mut self, id: &str) -> Self {
        self.config.worker_id = id.to_string();
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Restrict selection to a subcategory
    pub fn subcategory(mut self, subcategory: Option<String>) -> Self {
        self.config.subcategory = subcategory;
        self
    }

    /// Require an exact datasheet count
    pub fn datasheet_count(mut self, count: Option<i64>) -> Self {
        self.config.datasheet_count = count;
        self
    }

    /// Set poll interval in seconds; idle interval follows at double
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval = Duration::from_secs(secs);
        self.config.idle_interval = Duration::from_secs(secs * 2);
        self
    }

    /// Set per-job timeout
    pub fn job_timeout(mut self, duration: Duration) -> Self {
        self.config.job_timeout = duration;
        self
    }

    /// Set extraction output root
    pub fn output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output_dir = dir;
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_and_overrides() {
        let config = WorkerConfig::builder()
            .worker_id("w1")
            .batch_size(2)
            .poll_interval_secs(5)
            .subcategory(Some("pressure".to_string()))
            .build();

        assert_eq!(config.worker_id, "w1");
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.idle_interval, Duration::from_secs(10));
        assert_eq!(config.subcategory.as_deref(), Some("pressure"));
        // Untouched knobs keep their defaults
        assert_eq!(config.oversample_factor, 5);
        assert_eq!(config.job_timeout, Duration::from_secs(1200));
    }
}
