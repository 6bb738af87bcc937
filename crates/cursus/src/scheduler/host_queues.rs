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

//! Per-host FIFO queues of pending notification records.
//!
//! The store is pure bookkeeping: it knows nothing about fairness or worker
//! rendezvous, only order within a host and aggregate counts for the
//! backpressure checks. Queues are created on first enqueue and removed once
//! drained so long-idle hosts do not accumulate empty entries.

use std::collections::{HashMap, VecDeque};

use crate::model::NotificationRecord;

#[derive(Debug, Default)]
pub(crate) struct HostQueueStore {
    queues: HashMap<String, VecDeque<NotificationRecord>>,
}

impl HostQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the host's queue, creating the queue if absent.
    pub fn enqueue(&mut self, host: &str, record: NotificationRecord) {
        self.queues
            .entry(host.to_string())
            .or_default()
            .push_back(record);
    }

    /// Pops up to `max_batch` records in FIFO order and reports whether the
    /// host still has records queued.
    pub fn dequeue_batch(
        &mut self,
        host: &str,
        max_batch: usize,
    ) -> (Vec<NotificationRecord>, bool) {
        match self.queues.get_mut(host) {
            Some(queue) => {
                let take = max_batch.min(queue.len());
                let batch = queue.drain(..take).collect();
                (batch, !queue.is_empty())
            }
            None => (Vec::new(), false),
        }
    }

    /// Pushes records back to the front of the host's queue, preserving
    /// their order ahead of anything queued meanwhile.
    pub fn requeue_front(&mut self, host: &str, records: Vec<NotificationRecord>) {
        let queue = self.queues.entry(host.to_string()).or_default();
        for record in records.into_iter().rev() {
            queue.push_front(record);
        }
    }

    /// Total records pending for the listed hosts, or across all hosts when
    /// `hosts` is `None` or empty.
    pub fn count_pending(&self, hosts: Option<&[String]>) -> usize {
        match hosts {
            Some(hosts) if !hosts.is_empty() => hosts
                .iter()
                .filter_map(|host| self.queues.get(host))
                .map(VecDeque::len)
                .sum(),
            _ => self.queues.values().map(VecDeque::len).sum(),
        }
    }

    /// Drops the host's queue entry if it holds no records.
    pub fn remove_if_empty(&mut self, host: &str) {
        if self.queues.get(host).is_some_and(VecDeque::is_empty) {
            self.queues.remove(host);
        }
    }

    #[cfg(test)]
    pub fn has_queue(&self, host: &str) -> bool {
        self.queues.contains_key(host)
    }
}
