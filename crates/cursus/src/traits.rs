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

//! Collaborator interfaces consumed by the delivery engine.
//!
//! Persistent storage, proof/payload lookup, and payload signing all live
//! outside this crate; the engine talks to them through these traits. All of
//! them are object-safe and held as `Arc<dyn Trait>` so embedders can wire in
//! database-backed implementations while tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{NotificationKind, NotificationRecord, TxId};

/// Errors surfaced by repository and proof-provider implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("notification record not found for transaction {0}")]
    NotFound(String),

    #[error("repository backend error: {0}")]
    Backend(String),
}

/// Persistent store of notification state.
///
/// The store is the durable side of the at-least-once contract: the in-memory
/// scheduler sheds and forgets, the repository remembers. Delivery outcomes
/// are keyed the way the underlying schema is keyed, which differs between
/// success and failure paths (success by internal ids, failure by the
/// external transaction hash).
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Loads the notification data for a life-cycle event, or `None` when the
    /// transaction has no callback registered for this kind.
    async fn fetch_record(
        &self,
        kind: NotificationKind,
        tx_external_id: &TxId,
        block_internal_id: Option<i64>,
        ds_tx_id: Option<&TxId>,
    ) -> Result<Option<NotificationRecord>, RepositoryError>;

    /// Returns not-yet-sent notifications whose error count is below
    /// `max_error_count`, in a stable order, skipping the first `skip`
    /// matches and returning at most `limit`.
    async fn fetch_failed(
        &self,
        max_error_count: i32,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, RepositoryError>;

    /// Records a successful delivery.
    async fn mark_sent(
        &self,
        kind: NotificationKind,
        tx_internal_id: i64,
        block_internal_id: Option<i64>,
        ds_tx_id: Option<&TxId>,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Records a failed delivery attempt with its message and the new
    /// attempt count.
    async fn mark_error(
        &self,
        tx_external_id: &TxId,
        kind: NotificationKind,
        message: &str,
        error_count: i32,
    ) -> Result<(), RepositoryError>;

    /// Marks every notification stuck in an indeterminate dispatched state
    /// as failed. Called once at startup so work stranded by a crash
    /// re-enters the retry sweep.
    async fn mark_all_unsent_failed(&self) -> Result<(), RepositoryError>;
}

/// Source of callback payload data that is not embedded in the record.
#[async_trait]
pub trait ProofProvider: Send + Sync {
    /// Raw bytes of the competing transaction for a double-spend
    /// notification, or `None` when unavailable.
    async fn double_spend_payload(
        &self,
        kind: NotificationKind,
        tx_internal_id: i64,
    ) -> Result<Option<Vec<u8>>, RepositoryError>;

    /// Merkle proof in the legacy encoding.
    async fn merkle_proof(
        &self,
        tx_external_id: &TxId,
        block_hash: &TxId,
    ) -> Result<Option<serde_json::Value>, RepositoryError>;

    /// Merkle proof in the TSC encoding.
    async fn merkle_proof_tsc(
        &self,
        block_hash: &TxId,
        tx_external_id: &TxId,
    ) -> Result<Option<serde_json::Value>, RepositoryError>;
}

/// A signature over a callback payload digest, with the key that made it.
///
/// Both values are hex strings; the public key doubles as the signer
/// identity published in the envelope.
#[derive(Debug, Clone)]
pub struct SignaturePack {
    /// Hex-encoded signature bytes.
    pub signature: String,
    /// Hex-encoded public key of the signing identity.
    pub public_key: String,
}

/// Signs callback payloads under the gateway's current identity.
///
/// The identity is fetched lazily and cached by the delivery engine; `sign`
/// receives the identity the cache resolved so rotating implementations can
/// detect staleness and fail the attempt.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The currently active signing identity, or `None` when signing is
    /// disabled.
    async fn current_identity(&self) -> Result<Option<String>, crate::delivery::SigningError>;

    /// Signs a hex-encoded SHA-256 digest of the payload.
    async fn sign_digest(
        &self,
        identity: &str,
        digest_hex: &str,
    ) -> Result<SignaturePack, crate::delivery::SigningError>;
}
