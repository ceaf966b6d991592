//! External PDF extraction subsystem
//!
//! Extraction runs out-of-process: `spawner` launches the tool without
//! waiting, `coordinator` owns every in-flight job and polls them from a
//! single background task, and `artifacts` decides whether a finished (or
//! killed) run left usable output. Exit codes are advisory only.

pub mod artifacts;
pub mod coordinator;
pub mod options;
pub mod spawner;

pub use artifacts::{find_output, ExtractedOutput};
pub use coordinator::{ExtractionCoordinator, PollerConfig};
pub use options::{ExtractMode, ExtractorOptions};
pub use spawner::{spawn_extraction, ExtractJob};
