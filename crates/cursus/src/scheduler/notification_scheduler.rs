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

//! The host-fair notification scheduler.
//!
//! [`NotificationScheduler`] composes the per-host queues, the two dispatch
//! tracks, and the execution-time tracker under a single mutex. Producers
//! call [`add`](NotificationScheduler::add); delivery workers call
//! [`take_batch`](NotificationScheduler::take_batch) and feed response times
//! back through
//! [`record_execution_time`](NotificationScheduler::record_execution_time).
//!
//! The critical section is strictly computational: no network I/O, no disk,
//! no awaiting happens while the lock is held. `take_batch` either leaves
//! the lock with a batch in hand or with a parked oneshot receiver it then
//! awaits outside the lock.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::dispatch_track::FairDispatchTrack;
use super::execution_times::ExecutionTimeTracker;
use super::host_queues::HostQueueStore;
use crate::config::NotificationConfig;
use crate::model::NotificationRecord;

/// Everything the scheduler mutates, guarded by one mutex.
struct SchedulerState {
    queues: HostQueueStore,
    fast_track: FairDispatchTrack,
    slow_track: FairDispatchTrack,
    execution_times: ExecutionTimeTracker,
}

/// Host-fair, backpressure-aware scheduler for callback notifications.
///
/// Work is sharded by host key and served round-robin across hosts with
/// pending records, on two independent tracks: hosts with a slow response
/// history are isolated from fast ones so a stalled endpoint cannot starve
/// everyone else. Total memory is bounded by rejecting new work once the
/// queue limits are hit; rejected records are the caller's to persist for
/// the retry sweep.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use cursus::{NotificationConfig, NotificationScheduler};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(record: cursus::NotificationRecord) {
/// let scheduler = Arc::new(NotificationScheduler::new(&NotificationConfig::default()));
/// let accepted = scheduler.add(record, "merchant.example");
/// assert!(accepted);
///
/// let cancel = CancellationToken::new();
/// let batch = scheduler.take_batch(false, &cancel).await;
/// assert_eq!(batch.len(), 1);
/// # }
/// ```
pub struct NotificationScheduler {
    state: Mutex<SchedulerState>,
    max_batch: usize,
    max_instant_queue_size: usize,
    max_slow_notifications: usize,
}

impl NotificationScheduler {
    /// Creates a scheduler from the engine configuration.
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            max_batch: config.max_notifications_in_batch,
            max_instant_queue_size: config.max_instant_queue_size,
            max_slow_notifications: config.max_slow_notifications(),
            state: Mutex::new(SchedulerState {
                queues: HostQueueStore::new(),
                fast_track: FairDispatchTrack::new(),
                slow_track: FairDispatchTrack::new(),
                execution_times: ExecutionTimeTracker::new(
                    config.execution_times_window,
                    config.slow_host_threshold_ms,
                ),
            }),
        }
    }

    /// Offers a record for delivery to `host`.
    ///
    /// The host is routed to the slow or fast track by its current
    /// classification, then checked against the backpressure limits: a slow
    /// host is rejected once slow-host work fills the slow share of the
    /// queue, and any host is rejected once the total queue is full.
    ///
    /// # Returns
    ///
    /// `true` if the record was enqueued; `false` if it was shed. A shed
    /// record is not stored anywhere — the caller must persist it as a
    /// retryable error.
    pub fn add(&self, record: NotificationRecord, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let mut state = self.state.lock();
        let SchedulerState {
            queues,
            fast_track,
            slow_track,
            execution_times,
        } = &mut *state;

        let slow_hosts = execution_times.hosts_classified(true);
        let is_slow = slow_hosts.iter().any(|slow| *slow == host);

        if is_slow && queues.count_pending(Some(&slow_hosts)) >= self.max_slow_notifications {
            debug!(host = %host, "rejected notification: slow host share is full");
            return false;
        }
        if queues.count_pending(None) >= self.max_instant_queue_size {
            debug!(host = %host, "rejected notification: queue is full");
            return false;
        }

        queues.enqueue(&host, record);
        let track = if is_slow { slow_track } else { fast_track };
        track.host_became_ready(&host, queues, self.max_batch);
        true
    }

    /// Takes the next batch of records for one host on the requested track.
    ///
    /// Returns immediately when a host with pending work exists; otherwise
    /// the worker parks until new work arrives or `cancel` fires.
    ///
    /// # Returns
    ///
    /// The batch, or an empty vector if cancellation occurred. Batches are
    /// never empty otherwise: a host is only listed as ready while it has
    /// records queued.
    pub async fn take_batch(
        &self,
        want_slow: bool,
        cancel: &CancellationToken,
    ) -> Vec<NotificationRecord> {
        let receiver = {
            let mut state = self.state.lock();
            let SchedulerState {
                queues,
                fast_track,
                slow_track,
                ..
            } = &mut *state;
            let track = if want_slow { slow_track } else { fast_track };
            match track.try_take(queues, self.max_batch) {
                Some(batch) => return batch,
                None => track.park_worker(),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Vec::new(),
            batch = receiver => batch.unwrap_or_default(),
        }
    }

    /// Feeds one observed round-trip time into the host's rolling window,
    /// reclassifying the host for its next enqueue.
    pub fn record_execution_time(&self, host: &str, duration_ms: u64) {
        self.state
            .lock()
            .execution_times
            .record(host, duration_ms);
    }

    /// Whether the host is currently classified slow.
    pub fn is_host_slow(&self, host: &str) -> bool {
        self.state.lock().execution_times.is_slow(host)
    }

    /// Total records currently queued across all hosts.
    pub fn pending_count(&self) -> usize {
        self.state.lock().queues.count_pending(None)
    }
}
