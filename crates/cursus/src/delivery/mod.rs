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

//! Callback delivery: workers, envelopes, signing, and transport.
//!
//! This module owns everything between a batch leaving the scheduler and a
//! merchant endpoint acknowledging it. A record flows through payload
//! enrichment ([`worker_pool`]), envelope assembly ([`CallbackEnvelope`]),
//! optional signing ([`SignedEnvelope`]) and encryption, URL templating,
//! and finally the HTTP post.
//!
//! [`worker_pool`]: DeliveryWorkerPool

use thiserror::Error;

use crate::traits::RepositoryError;

mod client;
mod encryption;
mod envelope;
mod signing;
mod url_template;
mod worker_pool;

pub use client::CallbackClient;
pub use encryption::{CallbackEncryption, EncryptionError, AES_GCM_SCHEME};
pub use envelope::{CallbackEnvelope, DoubleSpendPayload, SignedEnvelope};
pub use signing::{verify_signed_envelope, KeypairSigner, SigningError};
pub use url_template::{format_callback_url, CALLBACK_REASON_PLACEHOLDER};
pub use worker_pool::{DeliveryHandles, DeliveryWorkerPool, QUEUE_FULL_MESSAGE};

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid callback url {url}: {reason}")]
    InvalidCallbackUrl { url: String, reason: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("callback responded with status {0}")]
    HttpStatus(u16),

    #[error("failed to prepare callback payload: {0}")]
    DataPreparation(String),

    #[error("failed to serialize callback envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("delivery cancelled by shutdown")]
    Cancelled,
}
