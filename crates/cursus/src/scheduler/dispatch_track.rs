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

//! Rendezvous between ready hosts and waiting workers for one speed class.
//!
//! Each track pairs two queues: host keys with undispatched work, and parked
//! workers represented by oneshot senders. Whichever side arrives second
//! completes the match; the side that arrives first waits. Fairness comes
//! from always serving the *front* of the ready-host queue and re-appending
//! a partially drained host at the back, so active hosts round-robin and no
//! host rides its own readiness event past the others.
//!
//! All methods run under the scheduler's mutex and never touch the network.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::warn;

use super::host_queues::HostQueueStore;
use crate::model::NotificationRecord;

#[derive(Debug, Default)]
pub(crate) struct FairDispatchTrack {
    ready_hosts: VecDeque<String>,
    waiting_workers: VecDeque<oneshot::Sender<Vec<NotificationRecord>>>,
}

impl FairDispatchTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes that `host` has undispatched work and, if a worker is parked,
    /// resolves that worker with a batch from the front host of the queue.
    ///
    /// A host already listed is left where it is; its new record rides along
    /// when the host next reaches the front.
    pub fn host_became_ready(&mut self, host: &str, store: &mut HostQueueStore, max_batch: usize) {
        if self.ready_hosts.iter().any(|ready| ready == host) {
            return;
        }
        self.ready_hosts.push_back(host.to_string());

        if !self.waiting_workers.is_empty() {
            self.dispatch_front_host(store, max_batch);
        }
    }

    /// Immediately takes a batch from the front ready host, or `None` when
    /// no host has work.
    pub fn try_take(
        &mut self,
        store: &mut HostQueueStore,
        max_batch: usize,
    ) -> Option<Vec<NotificationRecord>> {
        let host = self.ready_hosts.pop_front()?;
        let (batch, has_more) = store.dequeue_batch(&host, max_batch);
        if batch.is_empty() {
            // A listed host always has queued records; an empty dequeue
            // means the ready queue and the store disagree.
            warn!(host = %host, "ready host had no queued records");
        }
        if has_more {
            self.ready_hosts.push_back(host);
        } else {
            store.remove_if_empty(&host);
        }
        Some(batch)
    }

    /// Parks the calling worker, returning the receiver it should await.
    pub fn park_worker(&mut self) -> oneshot::Receiver<Vec<NotificationRecord>> {
        let (sender, receiver) = oneshot::channel();
        self.waiting_workers.push_back(sender);
        receiver
    }

    /// Hands the front host's next batch to the oldest live parked worker.
    ///
    /// A worker whose receiver is already gone (cancelled while parked) is
    /// discarded and the batch is put back intact, so records never ride a
    /// dead slot.
    fn dispatch_front_host(&mut self, store: &mut HostQueueStore, max_batch: usize) {
        while let Some(worker) = self.waiting_workers.pop_front() {
            let Some(host) = self.ready_hosts.pop_front() else {
                self.waiting_workers.push_front(worker);
                return;
            };

            let (batch, has_more) = store.dequeue_batch(&host, max_batch);
            if batch.is_empty() {
                warn!(host = %host, "ready host had no queued records");
            }
            match worker.send(batch) {
                Ok(()) => {
                    if has_more {
                        self.ready_hosts.push_back(host);
                    } else {
                        store.remove_if_empty(&host);
                    }
                    return;
                }
                Err(batch) => {
                    store.requeue_front(&host, batch);
                    self.ready_hosts.push_front(host);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn ready_host_count(&self) -> usize {
        self.ready_hosts.len()
    }

    #[cfg(test)]
    pub fn waiting_worker_count(&self) -> usize {
        self.waiting_workers.len()
    }
}
