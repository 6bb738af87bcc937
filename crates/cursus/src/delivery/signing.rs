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

//! Payload signing for callback envelopes.
//!
//! The signing identity is fetched once from the [`Signer`] and cached for
//! the life of the engine; key rotation shows up as a failed send attempt,
//! not a silent identity switch. After producing a signature the engine
//! verifies it against its own payload before sending. Some signer
//! implementations race key rotation between signing and publishing, and a
//! callback signed with a key the receiver cannot resolve is worse than a
//! failed attempt that will be retried.

use std::sync::Arc;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use super::envelope::SignedEnvelope;
use crate::traits::{SignaturePack, Signer};

/// Errors that can occur while signing a callback payload.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to fetch current signing identity: {0}")]
    IdentityFetch(String),

    #[error("invalid signing key material: {0}")]
    InvalidKey(String),

    #[error("failed to create signature: {0}")]
    SignatureFailed(String),

    #[error("failed to serialize signed payload: {0}")]
    Serialization(String),

    #[error("Error while validating signature. Possible reason: incorrect configuration or key rotation")]
    SelfVerificationFailed,
}

/// Holds the optional signer and the lazily fetched identity.
///
/// Shared read-mostly across all delivery workers; the cache has its own
/// lock, separate from the scheduler's.
pub(crate) struct SigningContext {
    signer: Option<Arc<dyn Signer>>,
    cached_identity: RwLock<Option<String>>,
}

impl SigningContext {
    pub fn new(signer: Option<Arc<dyn Signer>>) -> Self {
        Self {
            signer,
            cached_identity: RwLock::new(None),
        }
    }

    /// The active signing identity, fetched on first use and cached.
    ///
    /// `None` when no signer is configured. A fetch that yields no identity
    /// is not cached, so the next attempt asks again.
    pub async fn current_identity(&self) -> Result<Option<String>, SigningError> {
        let Some(signer) = &self.signer else {
            return Ok(None);
        };

        if let Some(identity) = self.cached_identity.read().await.clone() {
            return Ok(Some(identity));
        }

        let fetched = signer.current_identity().await?;
        if let Some(identity) = &fetched {
            *self.cached_identity.write().await = Some(identity.clone());
        }
        Ok(fetched)
    }

    /// Wraps the canonical envelope JSON in a verified [`SignedEnvelope`],
    /// or passes it through untouched when no signer is configured.
    ///
    /// # Errors
    ///
    /// Fails when the identity cannot be resolved, the signer refuses, or
    /// the produced signature does not verify against the payload.
    pub async fn sign_if_required(&self, payload_json: String) -> Result<String, SigningError> {
        let Some(signer) = &self.signer else {
            return Ok(payload_json);
        };

        let identity = self.current_identity().await?.ok_or_else(|| {
            SigningError::IdentityFetch("signer returned no active identity".to_string())
        })?;

        let digest_hex = hex::encode(Sha256::digest(payload_json.as_bytes()));
        let pack = signer.sign_digest(&identity, &digest_hex).await?;

        let signed = SignedEnvelope {
            payload: payload_json,
            signature: Some(pack.signature),
            public_key: Some(pack.public_key),
            encoding: "UTF-8".to_string(),
            mimetype: "application/json".to_string(),
        };
        if !verify_signed_envelope(&signed) {
            return Err(SigningError::SelfVerificationFailed);
        }

        serde_json::to_string(&signed).map_err(|e| SigningError::Serialization(e.to_string()))
    }
}

/// Verifies a signed envelope's signature over its payload.
///
/// Returns `false` for unsigned envelopes and for any malformed signature
/// or key material.
pub fn verify_signed_envelope(envelope: &SignedEnvelope) -> bool {
    let (Some(signature_hex), Some(public_key_hex)) =
        (&envelope.signature, &envelope.public_key)
    else {
        return false;
    };

    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(signature_bytes) = <[u8; 64]>::try_from(signature_bytes) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };

    let digest = Sha256::digest(envelope.payload.as_bytes());
    let signature = Signature::from_bytes(&signature_bytes);
    verifying_key.verify(&digest, &signature).is_ok()
}

/// An Ed25519 [`Signer`] whose identity is its own public key, hex encoded.
pub struct KeypairSigner {
    identity: String,
    signing_key: SigningKey,
}

impl KeypairSigner {
    /// Builds a signer from a 32-byte private key seed.
    pub fn new(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let identity = hex::encode(signing_key.verifying_key().to_bytes());
        Self {
            identity,
            signing_key,
        }
    }

    /// Generates a signer with a fresh random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut csprng);
        let identity = hex::encode(signing_key.verifying_key().to_bytes());
        Self {
            identity,
            signing_key,
        }
    }

    /// The hex public key this signer publishes as its identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

#[async_trait::async_trait]
impl Signer for KeypairSigner {
    async fn current_identity(&self) -> Result<Option<String>, SigningError> {
        Ok(Some(self.identity.clone()))
    }

    async fn sign_digest(
        &self,
        identity: &str,
        digest_hex: &str,
    ) -> Result<SignaturePack, SigningError> {
        if identity != self.identity {
            return Err(SigningError::SignatureFailed(format!(
                "unknown signing identity {identity}"
            )));
        }
        let digest = hex::decode(digest_hex)
            .map_err(|e| SigningError::SignatureFailed(format!("invalid digest hex: {e}")))?;
        let signature = self.signing_key.sign(&digest);
        Ok(SignaturePack {
            signature: hex::encode(signature.to_bytes()),
            public_key: self.identity.clone(),
        })
    }
}
