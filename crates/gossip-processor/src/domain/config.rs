//! Configuration value objects for the processor.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::MessageId;

/// Processor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Minimum weight magnitude a payload nonce must satisfy.
    ///
    /// Carried for the future nonce check; no weight validation runs today.
    pub valid_mwm: u64,
    /// Number of worker threads draining the submission queue.
    pub worker_count: usize,
    /// Capacity of the submission queue; `process` blocks when it is full.
    pub worker_queue_size: usize,
    /// Work-unit cache tuning.
    pub work_unit_cache: CacheConfig,
    /// Message ids of milestone payloads to reject regardless of parse
    /// success. Supplied by the deployment; empty by default.
    pub invalid_milestone_ids: HashSet<MessageId>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            valid_mwm: 14,
            worker_count: 64,
            worker_queue_size: 50_000,
            work_unit_cache: CacheConfig::default(),
            invalid_milestone_ids: HashSet::new(),
        }
    }
}

/// Work-unit cache tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long an idle entry (no retained handles) lingers before eviction.
    pub cache_time_ms: u64,
    /// Handle-leak detection.
    pub leak_detection: LeakDetectionConfig,
}

impl CacheConfig {
    /// The eviction delay as a [`Duration`].
    pub fn cache_time(&self) -> Duration {
        Duration::from_millis(self.cache_time_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_time_ms: 1_500,
            leak_detection: LeakDetectionConfig::default(),
        }
    }
}

/// Leak detection for retained cache handles.
///
/// Violations are reported through `tracing` warnings; they never fail the
/// offending operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakDetectionConfig {
    /// Whether acquisition tracking is on.
    pub enabled: bool,
    /// Cap on simultaneously retained handles per entry.
    pub max_consumers_per_object: u32,
    /// Hold time after which a still-retained handle is suspect.
    pub max_consumer_hold_time_secs: u64,
}

impl LeakDetectionConfig {
    /// The hold-time limit as a [`Duration`].
    pub fn max_consumer_hold_time(&self) -> Duration {
        Duration::from_secs(self.max_consumer_hold_time_secs)
    }
}

impl Default for LeakDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_consumers_per_object: 20,
            max_consumer_hold_time_secs: 100,
        }
    }
}
