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

//! Domain model for callback notifications.
//!
//! A [`NotificationRecord`] is one pending callback to a merchant endpoint.
//! Records are created by the event layer, queued per host by the scheduler,
//! and consumed by delivery workers. Host keys (the lowercased hostname of
//! the callback URL) are the fairness unit; they are derived, never stored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 32-byte transaction or block hash, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId([u8; 32]);

impl TxId {
    /// Wraps raw hash bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrows the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering of the hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for TxId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The life-cycle event a callback reports.
///
/// The serialized form doubles as the `callbackReason` string on the wire
/// and as the substitution value for the callback URL placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    /// A competing transaction spending the same inputs was mined.
    DoubleSpend,
    /// A competing transaction was seen in the mempool.
    DoubleSpendAttempt,
    /// The transaction was mined and a merkle proof is available.
    MerkleProof,
}

impl NotificationKind {
    /// Canonical wire string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DoubleSpend => "doubleSpend",
            NotificationKind::DoubleSpendAttempt => "doubleSpendAttempt",
            NotificationKind::MerkleProof => "merkleProof",
        }
    }

    /// True for both mined and mempool double-spend kinds.
    pub fn is_double_spend(&self) -> bool {
        matches!(
            self,
            NotificationKind::DoubleSpend | NotificationKind::DoubleSpendAttempt
        )
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which merkle proof encoding the callback consumer asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MerkleFormat {
    /// The original proof object.
    #[default]
    Legacy,
    /// The TSC standardized proof format.
    Tsc,
}

/// One pending callback notification.
///
/// A record lives in exactly one place at a time: the per-host queue inside
/// the scheduler, or the hands of the single worker delivering it. Terminal
/// state (sent timestamp, error count) is persisted by the repository, not
/// held here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// What happened to the transaction.
    pub kind: NotificationKind,

    /// Transaction hash as known to the merchant.
    pub tx_external_id: TxId,

    /// Repository row id of the transaction.
    pub tx_internal_id: i64,

    /// Repository row id of the block, when the event is block-scoped.
    pub block_internal_id: Option<i64>,

    /// Destination URL, possibly containing the callback reason placeholder.
    pub callback_url: String,

    /// Bearer token sent with the callback request, when configured.
    pub callback_token: Option<String>,

    /// Encryption descriptor; non-empty means the callback body is posted
    /// as an encrypted octet stream.
    pub callback_encryption: Option<String>,

    /// Hash of the containing block, when applicable.
    pub block_hash: Option<TxId>,

    /// Height of the containing block, -1 when not applicable.
    pub block_height: i64,

    /// The competing transaction for double-spend kinds.
    pub ds_tx_id: Option<TxId>,

    /// Precomputed or enriched callback payload. Workers fill this from the
    /// proof provider when absent.
    pub payload: Option<serde_json::Value>,

    /// Proof encoding requested by the callback consumer.
    pub merkle_format: MerkleFormat,

    /// Number of failed delivery attempts recorded so far.
    pub error_count: i32,

    /// When the record was enqueued.
    pub created_at: DateTime<Utc>,
}

/// A life-cycle event observed by the node layer, used to look up and
/// enqueue the matching notification record.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// What happened.
    pub kind: NotificationKind,

    /// Transaction the event concerns.
    pub tx_external_id: TxId,

    /// Block row id for block-scoped events.
    pub block_internal_id: Option<i64>,

    /// Competing transaction for double-spend events.
    pub ds_tx_id: Option<TxId>,
}
