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

//! The delivery worker pool.
//!
//! Workers pull host batches from the [`NotificationScheduler`] and drive
//! each record through enrichment, envelope assembly, signing, and the HTTP
//! post, recording the outcome in the repository either way. A fixed share
//! of the pool serves only slow hosts so a merchant with a degraded endpoint
//! cannot absorb every worker.
//!
//! The pool is also the intake: [`DeliveryWorkerPool::enqueue`] resolves a
//! transaction life-cycle event to its notification record and offers it to
//! the scheduler, falling back to a persisted error when the in-memory
//! queue refuses it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::CallbackClient;
use super::encryption::CallbackEncryption;
use super::envelope::{CallbackEnvelope, DoubleSpendPayload};
use super::signing::SigningContext;
use super::url_template::{callback_host, format_callback_url};
use super::DeliveryError;
use crate::clock::Clock;
use crate::config::NotificationConfig;
use crate::model::{MerkleFormat, NotificationEvent, NotificationRecord};
use crate::scheduler::NotificationScheduler;
use crate::traits::{NotificationRepository, ProofProvider, Signer};

/// Error recorded against a notification the scheduler refused to queue.
pub const QUEUE_FULL_MESSAGE: &str = "Queue is full or too many notifications for slow hosts.";

/// Owns the delivery workers and everything one delivery needs.
pub struct DeliveryWorkerPool {
    scheduler: Arc<NotificationScheduler>,
    repository: Arc<dyn NotificationRepository>,
    proofs: Arc<dyn ProofProvider>,
    signing: SigningContext,
    clock: Arc<dyn Clock>,
    config: NotificationConfig,
}

/// Join handles and the cancellation token for a started pool.
pub struct DeliveryHandles {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl DeliveryHandles {
    /// Token that stops the workers when cancelled. Clones observe the same
    /// cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the workers and waits for all of them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for result in future::join_all(self.handles).await {
            if let Err(e) = result {
                warn!("Delivery worker ended abnormally: {}", e);
            }
        }
    }
}

impl DeliveryWorkerPool {
    /// Assembles a pool from its collaborators. No workers run until
    /// [`start`](DeliveryWorkerPool::start).
    pub fn new(
        scheduler: Arc<NotificationScheduler>,
        repository: Arc<dyn NotificationRepository>,
        proofs: Arc<dyn ProofProvider>,
        signer: Option<Arc<dyn Signer>>,
        clock: Arc<dyn Clock>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            scheduler,
            repository,
            proofs,
            signing: SigningContext::new(signer),
            clock,
            config,
        }
    }

    /// The scheduler this pool drains.
    pub fn scheduler(&self) -> &Arc<NotificationScheduler> {
        &self.scheduler
    }

    /// Spawns the delivery workers.
    ///
    /// Notifications stranded in an indeterminate state by a previous run
    /// are marked failed first, so the retry sweep picks them up instead of
    /// losing them.
    ///
    /// # Errors
    ///
    /// Fails when the repository cannot reset stranded notifications.
    pub async fn start(self: Arc<Self>) -> Result<DeliveryHandles, DeliveryError> {
        self.repository.mark_all_unsent_failed().await?;

        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            let slow = worker_id < self.config.slow_worker_count();
            let pool = Arc::clone(&self);
            let worker_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                Self::worker_loop(pool, worker_id, slow, worker_cancel).await;
            }));
        }
        info!(
            "Started {} delivery workers ({} reserved for slow hosts)",
            self.config.worker_count,
            self.config.slow_worker_count()
        );

        Ok(DeliveryHandles { handles, cancel })
    }

    /// Resolves a life-cycle event to its notification record and queues it
    /// for delivery.
    ///
    /// Returns `false` when the transaction has no callback registered for
    /// this kind, the record could not be resolved, the callback URL is
    /// unusable, or the scheduler refused the record. Apart from the
    /// missing registration, every refusal is persisted as a delivery
    /// error (a full queue uses [`QUEUE_FULL_MESSAGE`]) so the retry sweep
    /// eventually picks the notification up.
    ///
    /// # Errors
    ///
    /// Fails only when persisting a delivery error fails itself.
    pub async fn enqueue(&self, event: NotificationEvent) -> Result<bool, DeliveryError> {
        let kind = event.kind;
        let tx_external_id = event.tx_external_id;

        let fetched = self
            .repository
            .fetch_record(
                kind,
                &tx_external_id,
                event.block_internal_id,
                event.ds_tx_id.as_ref(),
            )
            .await;
        let mut record = match fetched {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(tx = %tx_external_id, kind = kind.as_str(), "No notification data for event");
                return Ok(false);
            }
            Err(e) => {
                error!(tx = %tx_external_id, kind = kind.as_str(), "Failed to resolve notification: {}", e);
                self.repository
                    .mark_error(&tx_external_id, kind, &e.to_string(), 0)
                    .await?;
                return Ok(false);
            }
        };
        record.kind = kind;
        record.created_at = self.clock.utc_now();

        let host = match callback_host(&record.callback_url) {
            Ok(host) => host,
            Err(e) => {
                warn!(tx = %tx_external_id, "Rejecting notification: {}", e);
                self.repository
                    .mark_error(&tx_external_id, kind, &e.to_string(), 0)
                    .await?;
                return Ok(false);
            }
        };

        if self.scheduler.add(record, &host) {
            debug!(tx = %tx_external_id, kind = kind.as_str(), host = %host, "Notification queued");
            Ok(true)
        } else {
            warn!(tx = %tx_external_id, kind = kind.as_str(), "Notification rejected by full queue");
            self.repository
                .mark_error(&tx_external_id, kind, QUEUE_FULL_MESSAGE, 0)
                .await?;
            Ok(false)
        }
    }

    /// Builds a delivery client for a single record's callback URL.
    ///
    /// The retry sweep uses this, where records arrive one at a time
    /// rather than batched by host; embedders redriving individual records
    /// can do the same.
    ///
    /// # Errors
    ///
    /// Fails when the URL has no usable host or the HTTP client cannot be
    /// constructed.
    pub fn client_for(&self, callback_url: &str) -> Result<CallbackClient, DeliveryError> {
        CallbackClient::build(callback_host(callback_url)?)
    }

    async fn worker_loop(
        pool: Arc<Self>,
        worker_id: usize,
        slow: bool,
        cancel: CancellationToken,
    ) {
        debug!(worker_id, slow, "Delivery worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let batch = pool.scheduler.take_batch(slow, &cancel).await;
            if batch.is_empty() {
                continue;
            }
            pool.deliver_batch(batch, slow, &cancel).await;
        }
        debug!(worker_id, "Delivery worker stopped");
    }

    /// Delivers one host batch over a client built for that host.
    async fn deliver_batch(
        &self,
        batch: Vec<NotificationRecord>,
        slow: bool,
        cancel: &CancellationToken,
    ) {
        let Some(first) = batch.first() else {
            return;
        };
        let client = match callback_host(&first.callback_url).and_then(CallbackClient::build) {
            Ok(client) => client,
            Err(e) => {
                warn!(records = batch.len(), "Cannot build client for batch: {}", e);
                for mut record in batch {
                    record.error_count += 1;
                    self.persist_error(&record, &e.to_string()).await;
                }
                return;
            }
        };

        let timeout = self.config.timeout_for(slow);
        debug!(
            host = client.host(),
            records = batch.len(),
            slow,
            "Delivering batch"
        );
        for record in batch {
            if cancel.is_cancelled() {
                break;
            }
            self.send_record(&client, record, timeout, cancel).await;
        }
    }

    /// Delivers a single record and persists the outcome.
    ///
    /// Returns whether the callback was accepted. Failures never propagate;
    /// they are recorded against the notification so the rest of the batch
    /// still gets its attempt.
    pub async fn send_record(
        &self,
        client: &CallbackClient,
        mut record: NotificationRecord,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let payload = match self.prepare_payload(&record).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    tx = %record.tx_external_id,
                    kind = record.kind.as_str(),
                    "Failed to prepare callback payload: {}",
                    e
                );
                record.error_count += 1;
                self.persist_error(&record, &e.to_string()).await;
                return false;
            }
        };

        match self
            .post_callback(client, &record, payload, timeout, cancel)
            .await
        {
            Ok(()) => {
                let sent_at = self.clock.utc_now();
                if let Err(e) = self
                    .repository
                    .mark_sent(
                        record.kind,
                        record.tx_internal_id,
                        record.block_internal_id,
                        record.ds_tx_id.as_ref(),
                        sent_at,
                    )
                    .await
                {
                    error!(
                        tx = %record.tx_external_id,
                        "Callback delivered but could not be marked sent: {}",
                        e
                    );
                }
                debug!(
                    tx = %record.tx_external_id,
                    kind = record.kind.as_str(),
                    host = client.host(),
                    "Callback delivered"
                );
                true
            }
            Err(e) => {
                warn!(
                    tx = %record.tx_external_id,
                    kind = record.kind.as_str(),
                    host = client.host(),
                    "Callback delivery failed: {}",
                    e
                );
                record.error_count += 1;
                self.persist_error(&record, &e.to_string()).await;
                false
            }
        }
    }

    async fn persist_error(&self, record: &NotificationRecord, message: &str) {
        if let Err(e) = self
            .repository
            .mark_error(&record.tx_external_id, record.kind, message, record.error_count)
            .await
        {
            error!(tx = %record.tx_external_id, "Could not record delivery error: {}", e);
        }
    }

    /// Resolves the kind-specific callback payload for a record.
    ///
    /// A payload already embedded in the record is used as-is; otherwise
    /// double-spend records get the competing transaction's bytes and
    /// merkle records get their proof in the subscribed encoding.
    async fn prepare_payload(
        &self,
        record: &NotificationRecord,
    ) -> Result<serde_json::Value, DeliveryError> {
        if let Some(payload) = &record.payload {
            return Ok(payload.clone());
        }

        if record.kind.is_double_spend() {
            let ds_tx_id = record.ds_tx_id.as_ref().ok_or_else(|| {
                DeliveryError::DataPreparation(
                    "double spend notification without a competing transaction id".to_string(),
                )
            })?;
            let raw = self
                .proofs
                .double_spend_payload(record.kind, record.tx_internal_id)
                .await?
                .ok_or_else(|| {
                    DeliveryError::DataPreparation(format!(
                        "missing double spend transaction for {}",
                        record.tx_external_id
                    ))
                })?;
            let payload = DoubleSpendPayload {
                double_spend_tx_id: ds_tx_id.to_hex(),
                payload: hex::encode(&raw),
            };
            return Ok(serde_json::to_value(payload)?);
        }

        let block_hash = record.block_hash.as_ref().ok_or_else(|| {
            DeliveryError::DataPreparation(
                "merkle proof notification without a block hash".to_string(),
            )
        })?;
        let proof = match record.merkle_format {
            MerkleFormat::Tsc => {
                self.proofs
                    .merkle_proof_tsc(block_hash, &record.tx_external_id)
                    .await?
            }
            MerkleFormat::Legacy => {
                self.proofs
                    .merkle_proof(&record.tx_external_id, block_hash)
                    .await?
            }
        };
        proof.ok_or_else(|| {
            DeliveryError::DataPreparation(format!(
                "missing merkle proof for {} in block {}",
                record.tx_external_id, block_hash
            ))
        })
    }

    /// Signs and posts the assembled envelope, recording the host's
    /// response time.
    ///
    /// The timing sample covers only the HTTP exchange and is recorded even
    /// when the post fails or is cancelled, so a host that times out counts
    /// as slow rather than not at all.
    async fn post_callback(
        &self,
        client: &CallbackClient,
        record: &NotificationRecord,
        payload: serde_json::Value,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let miner_id = self.signing.current_identity().await?;
        let envelope = CallbackEnvelope::new(
            &self.config.api_version,
            self.clock.utc_now(),
            miner_id,
            record,
            payload,
        );
        let body = self
            .signing
            .sign_if_required(serde_json::to_string(&envelope)?)
            .await?;
        let url = format_callback_url(&record.callback_url, record.kind.as_str());

        let started = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
            result = self.post_body(client, &url, record, body, timeout) => result,
        };
        self.scheduler
            .record_execution_time(client.host(), started.elapsed().as_millis() as u64);
        result
    }

    async fn post_body(
        &self,
        client: &CallbackClient,
        url: &str,
        record: &NotificationRecord,
        body: String,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        let token = record.callback_token.as_deref();
        match record
            .callback_encryption
            .as_deref()
            .filter(|descriptor| !descriptor.trim().is_empty())
        {
            Some(descriptor) => {
                let encryption = CallbackEncryption::parse(descriptor)?;
                let encrypted = encryption.encrypt(body.as_bytes())?;
                client
                    .post_octet_stream(url, token, encrypted, timeout)
                    .await
            }
            None => client.post_json(url, token, body, timeout).await,
        }
    }
}
