//! Engine limits and batch tracking.
//!
//! Bounds the orchestrator through configurable limits on:
//! - Worker pool size
//! - Persistence write timeout
//! - Document content size
//! - Batch size

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource limits for classification batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineLimits {
    /// Documents classified concurrently (default: 4)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-write timeout in milliseconds (default: 5000)
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Maximum document content size in bytes (default: 10MB)
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: u64,

    /// Maximum number of ids per batch (default: 1000)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_write_timeout_ms() -> u64 {
    5000
}
fn default_max_content_bytes() -> u64 {
    10 * 1024 * 1024
} // 10MB
fn default_max_batch_size() -> usize {
    1000
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            write_timeout_ms: default_write_timeout_ms(),
            max_content_bytes: default_max_content_bytes(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl EngineLimits {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Validate document content against the size limit
    pub fn validate_content(&self, content: &str) -> Result<(), LimitViolation> {
        let size = content.len() as u64;
        if size > self.max_content_bytes {
            return Err(LimitViolation::MaxContentBytes {
                actual: size,
                limit: self.max_content_bytes,
            });
        }
        Ok(())
    }

    /// Validate the number of ids in a batch request
    pub fn validate_batch(&self, size: usize) -> Result<(), LimitViolation> {
        if size > self.max_batch_size {
            return Err(LimitViolation::MaxBatchSize {
                actual: size,
                limit: self.max_batch_size,
            });
        }
        Ok(())
    }
}

/// Tracks progress during a batch
#[derive(Debug, Clone)]
pub struct BatchTracker {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: Instant,
}

impl Default for BatchTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchTracker {
    pub fn new() -> Self {
        Self {
            dispatched: 0,
            succeeded: 0,
            failed: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record_dispatch(&mut self) {
        self.dispatched += 1;
    }

    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Dispatched items still running
    pub fn in_flight(&self) -> usize {
        self.dispatched - self.succeeded - self.failed
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Limit violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("Maximum content bytes exceeded: {actual} > {limit}")]
    MaxContentBytes { actual: u64, limit: u64 },

    #[error("Maximum batch size exceeded: {actual} > {limit}")]
    MaxBatchSize { actual: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = EngineLimits::default();
        assert_eq!(limits.max_concurrency, 4);
        assert_eq!(limits.write_timeout(), Duration::from_secs(5));
        assert_eq!(limits.max_content_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_content_validation() {
        let limits = EngineLimits {
            max_content_bytes: 100,
            ..Default::default()
        };

        assert!(limits.validate_content("short").is_ok());

        let long_content = "x".repeat(200);
        let result = limits.validate_content(&long_content);
        assert!(matches!(result, Err(LimitViolation::MaxContentBytes { actual: 200, .. })));
    }

    #[test]
    fn test_batch_validation() {
        let limits = EngineLimits {
            max_batch_size: 2,
            ..Default::default()
        };
        assert!(limits.validate_batch(2).is_ok());
        assert!(matches!(
            limits.validate_batch(3),
            Err(LimitViolation::MaxBatchSize { actual: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_tracker_counts() {
        let mut tracker = BatchTracker::new();
        tracker.record_dispatch();
        tracker.record_dispatch();
        tracker.record_outcome(true);
        assert_eq!(tracker.in_flight(), 1);
        tracker.record_outcome(false);
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!((tracker.succeeded, tracker.failed), (1, 1));
    }
}
