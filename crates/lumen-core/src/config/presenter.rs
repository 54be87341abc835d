//! Presenter configuration sections

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PresenterError, PresenterResult};
use crate::types::MediaTime;

/// Root presenter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// Sample pool sizing
    pub pool: PoolConfig,
    /// Scheduling policy
    pub scheduler: SchedulerConfig,
    /// Pipeline event bus
    pub events: EventConfig,
}

impl PresenterConfig {
    /// Reject values the presenter cannot run with
    pub fn validate(&self) -> PresenterResult<()> {
        if self.pool.buffer_count == 0 {
            return Err(PresenterError::InvalidConfig(
                "pool.buffer_count must be at least 1".into(),
            ));
        }
        if self.scheduler.late_threshold_ms < self.scheduler.present_tolerance_ms {
            return Err(PresenterError::InvalidConfig(format!(
                "scheduler.late_threshold_ms ({}) is below present_tolerance_ms ({})",
                self.scheduler.late_threshold_ms, self.scheduler.present_tolerance_ms
            )));
        }
        if self.scheduler.retry_budget == 0 {
            return Err(PresenterError::InvalidConfig(
                "scheduler.retry_budget must be at least 1".into(),
            ));
        }
        if self.events.capacity == 0 {
            return Err(PresenterError::InvalidConfig(
                "events.capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Sample pool section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of presentation surfaces allocated per negotiated format
    pub buffer_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { buffer_count: 4 }
    }
}

/// Scheduler timing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Samples due within this window of the clock are presented immediately
    pub present_tolerance_ms: u64,
    /// Samples later than this are dropped instead of presented
    pub late_threshold_ms: u64,
    /// Presentation attempts allowed while the surface is unavailable
    pub retry_budget: u32,
    /// Wait between attempts when the surface is unavailable
    pub retry_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            present_tolerance_ms: 4,
            late_threshold_ms: 50,
            retry_budget: 3,
            retry_backoff_ms: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn present_tolerance(&self) -> MediaTime {
        MediaTime::from_millis(self.present_tolerance_ms as i64)
    }

    pub fn late_threshold(&self) -> MediaTime {
        MediaTime::from_millis(self.late_threshold_ms as i64)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Event bus section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Bounded capacity; per-frame events beyond it are discarded, while
    /// end-of-stream and error events have a small reserve on top
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}
