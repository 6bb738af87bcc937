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

//! Rolling round-trip-time windows used to classify hosts as slow or fast.
//!
//! Each host gets a bounded window of its most recent response times. A host
//! is slow once the integer mean of its window exceeds the configured
//! threshold, and is reclassified after every recorded sample. Hosts with no
//! history are optimistically fast: a new endpoint gets routed to the fast
//! track until it proves otherwise.
//!
//! The tracker is plain data; the scheduler's mutex guards all access.

use std::collections::{HashMap, VecDeque};

/// Per-host response time window with its cached classification.
#[derive(Debug)]
struct HostWindow {
    samples: VecDeque<u64>,
    sum: u64,
    slow: bool,
}

/// Tracks recent execution times per host and derives slow/fast labels.
#[derive(Debug)]
pub(crate) struct ExecutionTimeTracker {
    window_size: usize,
    slow_threshold_ms: u64,
    hosts: HashMap<String, HostWindow>,
}

impl ExecutionTimeTracker {
    pub fn new(window_size: usize, slow_threshold_ms: u64) -> Self {
        Self {
            window_size,
            slow_threshold_ms,
            hosts: HashMap::new(),
        }
    }

    /// Appends a sample to the host's window, evicting the oldest once the
    /// window is full, and recomputes the classification.
    pub fn record(&mut self, host: &str, duration_ms: u64) {
        let window = self
            .hosts
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| HostWindow {
                samples: VecDeque::new(),
                sum: 0,
                slow: false,
            });

        window.samples.push_back(duration_ms);
        window.sum += duration_ms;
        if window.samples.len() > self.window_size {
            if let Some(evicted) = window.samples.pop_front() {
                window.sum -= evicted;
            }
        }
        window.slow = window.sum / window.samples.len() as u64 > self.slow_threshold_ms;
    }

    /// Cached classification for a host; hosts without history are fast.
    pub fn is_slow(&self, host: &str) -> bool {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .map(|window| window.slow)
            .unwrap_or(false)
    }

    /// All hosts currently carrying the requested classification.
    pub fn hosts_classified(&self, want_slow: bool) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|(_, window)| window.slow == want_slow)
            .map(|(host, _)| host.clone())
            .collect()
    }
}
