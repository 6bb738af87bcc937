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

//! Wire format of callback bodies.
//!
//! Every callback carries a [`CallbackEnvelope`] describing the life-cycle
//! event. When signing is configured the envelope travels inside a
//! [`SignedEnvelope`]: the canonical envelope JSON as a string plus the
//! signature and public key over it, so receivers can verify byte-for-byte
//! what was signed. Without a signer the bare envelope JSON is posted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::NotificationRecord;

/// The callback body describing one transaction life-cycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackEnvelope {
    /// Gateway API version.
    pub api_version: String,

    /// When the callback was produced.
    pub timestamp: DateTime<Utc>,

    /// The gateway's signing identity, when one is configured.
    pub miner_id: Option<String>,

    /// Hash of the block the event concerns, or empty when not applicable.
    pub block_hash: String,

    /// Height of that block, -1 when not applicable.
    pub block_height: i64,

    /// The transaction the callback concerns.
    pub callback_tx_id: String,

    /// Why the callback fired; the notification kind wire string.
    pub callback_reason: String,

    /// Kind-specific payload: a double-spend report or a merkle proof.
    pub callback_payload: serde_json::Value,
}

impl CallbackEnvelope {
    /// Assembles the envelope for one record with its enriched payload.
    pub fn new(
        api_version: &str,
        timestamp: DateTime<Utc>,
        miner_id: Option<String>,
        record: &NotificationRecord,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            api_version: api_version.to_string(),
            timestamp,
            miner_id,
            block_hash: record
                .block_hash
                .map(|hash| hash.to_hex())
                .unwrap_or_default(),
            block_height: record.block_height,
            callback_tx_id: record.tx_external_id.to_hex(),
            callback_reason: record.kind.as_str().to_string(),
            callback_payload: payload,
        }
    }
}

/// Payload for double-spend callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoubleSpendPayload {
    /// The competing transaction's hash.
    pub double_spend_tx_id: String,

    /// Raw bytes of the competing transaction, hex encoded.
    pub payload: String,
}

/// A signed wrapper around the canonical envelope JSON.
///
/// `payload` is the exact string that was hashed and signed; parsing it
/// yields the [`CallbackEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    /// Canonical envelope JSON, exactly as signed.
    pub payload: String,

    /// Hex signature over the payload digest, absent when unsigned.
    pub signature: Option<String>,

    /// Hex public key of the signing identity, absent when unsigned.
    pub public_key: Option<String>,

    /// Character encoding of `payload`.
    pub encoding: String,

    /// Media type of `payload`.
    pub mimetype: String,
}
