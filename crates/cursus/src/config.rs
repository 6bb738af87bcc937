/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Configuration for the notification delivery engine.
//!
//! [`NotificationConfig`] carries every tunable the engine reads: worker pool
//! sizing, the slow/fast split, queue and batch limits, host classification
//! parameters, per-track response timeouts, and the retry sweep cadence.
//! Loading the values (files, environment, flags) is the embedding
//! application's concern; this module only defines the shape, the defaults,
//! and the validation rules.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by [`NotificationConfig::validate`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

/// Configuration for the notification scheduler, delivery worker pool and
/// retry sweeper.
///
/// All fields are public for direct construction; call
/// [`validate`](Self::validate) before handing the config to the engine.
///
/// # Example
///
/// ```rust
/// use cursus::NotificationConfig;
///
/// let config = NotificationConfig {
///     worker_count: 8,
///     slow_task_percentage: 25,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.slow_worker_count(), 2);
/// assert_eq!(config.fast_worker_count(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Total number of concurrent delivery workers (fast + slow).
    pub worker_count: usize,

    /// Percentage of workers and of queue capacity reserved for slow hosts.
    pub slow_task_percentage: u32,

    /// Maximum number of notifications pending in memory across all hosts.
    /// New work is rejected once this is reached.
    pub max_instant_queue_size: usize,

    /// Maximum number of notifications handed to one worker per dispatch turn.
    pub max_notifications_in_batch: usize,

    /// A host whose mean round-trip time exceeds this is classified slow.
    pub slow_host_threshold_ms: u64,

    /// Number of round-trip samples kept per host for classification.
    pub execution_times_window: usize,

    /// Notifications whose persisted error count reaches this are no longer
    /// picked up by the retry sweep.
    pub retry_count_ceiling: i32,

    /// Response timeout for requests to slow hosts.
    pub slow_host_timeout_ms: u64,

    /// Response timeout for requests to fast hosts.
    pub fast_host_timeout_ms: u64,

    /// Seconds between retry sweeps over persisted failed notifications.
    pub sweep_interval_secs: u64,

    /// API version stamped into every callback envelope.
    pub api_version: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            slow_task_percentage: 20,
            max_instant_queue_size: 1000,
            max_notifications_in_batch: 100,
            slow_host_threshold_ms: 1000, // 1 second mean marks a host slow
            execution_times_window: 10,
            retry_count_ceiling: 10,
            slow_host_timeout_ms: 5000,
            fast_host_timeout_ms: 2000,
            sweep_interval_secs: 60,
            api_version: "1.5.0".to_string(),
        }
    }
}

impl NotificationConfig {
    /// Validates all fields against their allowed ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=100).contains(&self.worker_count) {
            return Err(ConfigError::OutOfRange {
                field: "worker_count",
                min: 2,
                max: 100,
                value: self.worker_count as i64,
            });
        }
        if !(1..=100).contains(&self.slow_task_percentage) {
            return Err(ConfigError::OutOfRange {
                field: "slow_task_percentage",
                min: 1,
                max: 100,
                value: self.slow_task_percentage as i64,
            });
        }
        if self.max_instant_queue_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_instant_queue_size",
            });
        }
        if self.max_notifications_in_batch == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_notifications_in_batch",
            });
        }
        if self.slow_host_threshold_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "slow_host_threshold_ms",
            });
        }
        if self.execution_times_window == 0 {
            return Err(ConfigError::NotPositive {
                field: "execution_times_window",
            });
        }
        if self.retry_count_ceiling <= 0 {
            return Err(ConfigError::NotPositive {
                field: "retry_count_ceiling",
            });
        }
        if self.slow_host_timeout_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "slow_host_timeout_ms",
            });
        }
        if self.fast_host_timeout_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "fast_host_timeout_ms",
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::NotPositive {
                field: "sweep_interval_secs",
            });
        }
        Ok(())
    }

    /// Number of workers dedicated to the slow track,
    /// `ceil(worker_count * slow_task_percentage / 100)`.
    pub fn slow_worker_count(&self) -> usize {
        (self.worker_count * self.slow_task_percentage as usize).div_ceil(100)
    }

    /// Number of workers dedicated to the fast track.
    pub fn fast_worker_count(&self) -> usize {
        self.worker_count - self.slow_worker_count()
    }

    /// Maximum number of notifications that may be pending for slow hosts,
    /// derived from the queue size and the slow share.
    pub fn max_slow_notifications(&self) -> usize {
        self.max_instant_queue_size * self.slow_task_percentage as usize / 100
    }

    /// Response timeout for the given track.
    pub fn timeout_for(&self, slow: bool) -> Duration {
        if slow {
            Duration::from_millis(self.slow_host_timeout_ms)
        } else {
            Duration::from_millis(self.fast_host_timeout_ms)
        }
    }
}
