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

//! Periodic redelivery of failed notifications.
//!
//! Each cycle re-attempts one page of the repository's failed set,
//! bypassing the in-memory scheduler. Records whose error count has
//! reached the retry ceiling are excluded by the fetch itself. A
//! successful redelivery removes the record from the failed set, so the
//! page cursor only advances past records that failed again; the cursor
//! carries over between cycles and resets to the front once the set runs
//! out beneath it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::NotificationConfig;
use crate::delivery::DeliveryWorkerPool;
use crate::traits::{NotificationRepository, RepositoryError};

/// Records fetched per page of a sweep.
const SWEEP_PAGE_SIZE: usize = 100;

/// Background task that periodically re-attempts failed notifications.
pub struct RetrySweeper {
    pool: Arc<DeliveryWorkerPool>,
    repository: Arc<dyn NotificationRepository>,
    config: NotificationConfig,
    skip: usize,
}

impl RetrySweeper {
    pub fn new(
        pool: Arc<DeliveryWorkerPool>,
        repository: Arc<dyn NotificationRepository>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            pool,
            repository,
            config,
            skip: 0,
        }
    }

    /// Spawns the sweep loop. The first cycle runs immediately; later
    /// cycles follow the configured interval.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Retry sweeper started with a {}s interval",
            self.config.sweep_interval_secs
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.sweep_once(&cancel).await {
                error!("Retry sweep failed: {}", e);
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.config.sweep_interval_secs)) => {}
            }
        }
        debug!("Retry sweeper stopped");
    }

    /// Runs one sweep cycle: re-attempts a single page of the failed set
    /// and advances the cursor past whatever failed again. Consecutive
    /// cycles walk the whole set a page at a time.
    ///
    /// Every retry uses the slow-host timeout; a host is in the failed set
    /// because something already went wrong with it once.
    ///
    /// # Errors
    ///
    /// Fails when the page cannot be fetched. Individual redelivery
    /// failures are recorded against their notifications and do not stop
    /// the cycle.
    pub async fn sweep_once(&mut self, cancel: &CancellationToken) -> Result<(), RepositoryError> {
        let timeout = self.config.timeout_for(true);

        let mut page = self
            .repository
            .fetch_failed(self.config.retry_count_ceiling, self.skip, SWEEP_PAGE_SIZE)
            .await?;
        if page.is_empty() && self.skip > 0 {
            // The set shrank beneath the cursor; start over from the front
            // so records that shifted backwards are not skipped forever.
            self.skip = 0;
            page = self
                .repository
                .fetch_failed(self.config.retry_count_ceiling, 0, SWEEP_PAGE_SIZE)
                .await?;
        }
        if page.is_empty() {
            return Ok(());
        }

        let page_len = page.len();
        let mut successful = 0usize;
        debug!(
            records = page_len,
            skip = self.skip,
            "Retrying failed notifications"
        );
        for record in page {
            if cancel.is_cancelled() {
                break;
            }
            let client = match self.pool.client_for(&record.callback_url) {
                Ok(client) => client,
                Err(e) => {
                    warn!(tx = %record.tx_external_id, "Skipping retry: {}", e);
                    continue;
                }
            };
            if self.pool.send_record(&client, record, timeout, cancel).await {
                successful += 1;
            }
        }

        // Redelivered records leave the failed set, so only the still
        // failing remainder shifts the next page.
        self.skip += page_len - successful;
        Ok(())
    }
}
