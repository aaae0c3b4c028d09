//! Health checks for the probe endpoint.
//!
//! Each [`HealthIndicator`] answers one question about the process's
//! ability to serve requests; the [`HealthService`] aggregates them
//! into the `{status, details, requestId}` document emitted on
//! `GET /health`. A single failing indicator takes the whole report to
//! `DOWN` (HTTP 503), which is what container orchestrators key on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Free-space floor below which the disk indicator reports unhealthy.
pub const MIN_FREE_BYTES: u64 = 10 * 1024 * 1024;

/// Aggregate health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// All indicators passed.
    Up,
    /// At least one indicator failed.
    Down,
}

/// Result of a single indicator check.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorReport {
    /// Whether the check passed.
    pub healthy: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl IndicatorReport {
    /// A passing report.
    #[must_use]
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
        }
    }

    /// A failing report.
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
        }
    }
}

/// One health probe.
pub trait HealthIndicator: Send + Sync {
    /// Stable name used as the key in the `details` map.
    fn name(&self) -> &str;

    /// Runs the check. Must be cheap; this executes on every probe.
    fn check(&self) -> IndicatorReport;
}

/// Verifies the root directory still exists and is enumerable.
#[derive(Debug)]
pub struct RootDirIndicator {
    root: PathBuf,
}

impl RootDirIndicator {
    /// Probes the given root directory.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl HealthIndicator for RootDirIndicator {
    fn name(&self) -> &str {
        "rootDirectory"
    }

    fn check(&self) -> IndicatorReport {
        if !self.root.is_dir() {
            return IndicatorReport::unhealthy("root directory is missing or not a directory");
        }
        match std::fs::read_dir(&self.root) {
            Ok(_) => IndicatorReport::healthy("root directory accessible"),
            Err(error) => {
                IndicatorReport::unhealthy(format!("root directory not readable: {error}"))
            },
        }
    }
}

/// Verifies the filesystem holding the root still has headroom.
#[derive(Debug)]
pub struct DiskSpaceIndicator {
    path: PathBuf,
    min_free_bytes: u64,
}

impl DiskSpaceIndicator {
    /// Probes free space on the filesystem containing `path`.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            min_free_bytes: MIN_FREE_BYTES,
        }
    }

    /// Overrides the free-space floor.
    #[must_use]
    pub const fn with_min_free_bytes(mut self, min_free_bytes: u64) -> Self {
        self.min_free_bytes = min_free_bytes;
        self
    }

    fn free_bytes(&self) -> Result<u64, String> {
        let stats = nix::sys::statvfs::statvfs(&self.path)
            .map_err(|error| format!("statvfs failed: {error}"))?;
        // fragment_size's integer width varies by platform.
        #[allow(clippy::unnecessary_cast)]
        let fragment_size = stats.fragment_size() as u64;
        Ok(stats.blocks_available().saturating_mul(fragment_size))
    }
}

impl HealthIndicator for DiskSpaceIndicator {
    fn name(&self) -> &str {
        "diskSpace"
    }

    fn check(&self) -> IndicatorReport {
        match self.free_bytes() {
            Ok(free) if free >= self.min_free_bytes => {
                IndicatorReport::healthy(format!("{free} bytes free"))
            },
            Ok(free) => IndicatorReport::unhealthy(format!(
                "{free} bytes free, below the {} byte floor",
                self.min_free_bytes
            )),
            Err(message) => IndicatorReport::unhealthy(message),
        }
    }
}

/// The aggregate health document served to probes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `UP` or `DOWN`.
    pub status: Status,
    /// Per-indicator outcomes, keyed by indicator name.
    pub details: BTreeMap<String, IndicatorReport>,
    /// Correlation id for tracing a probe through the logs.
    pub request_id: String,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Whether this report maps to HTTP 200.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == Status::Up
    }
}

/// Runs the configured indicators and folds their reports.
pub struct HealthService {
    indicators: Vec<Box<dyn HealthIndicator>>,
}

impl HealthService {
    /// The standard indicator set for a root directory.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            indicators: vec![
                Box::new(RootDirIndicator::new(root)),
                Box::new(DiskSpaceIndicator::new(root)),
            ],
        }
    }

    /// Builds a service over an explicit indicator set.
    #[must_use]
    pub fn with_indicators(indicators: Vec<Box<dyn HealthIndicator>>) -> Self {
        Self { indicators }
    }

    /// Runs every indicator; any failure takes the aggregate to
    /// `DOWN`.
    #[must_use]
    pub fn check(&self) -> HealthReport {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut healthy = true;
        let mut details = BTreeMap::new();

        for indicator in &self.indicators {
            let report = indicator.check();
            if !report.healthy {
                debug!(
                    indicator = indicator.name(),
                    request_id, "health indicator failed"
                );
                healthy = false;
            }
            details.insert(indicator.name().to_string(), report);
        }

        HealthReport {
            status: if healthy { Status::Up } else { Status::Down },
            details,
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService")
            .field("indicators", &self.indicators.len())
            .finish()
    }
}
