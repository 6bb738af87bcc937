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

//! Optional payload encryption for callback bodies.
//!
//! A merchant subscription may carry an encryption descriptor of the form
//! `aes-256-gcm <base64 key>`. When present, the serialized callback body
//! is encrypted with AES-256-GCM and posted as a binary payload instead of
//! JSON. The wire format is `nonce || ciphertext || tag` with a random
//! 12-byte nonce per message.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use thiserror::Error;

/// Scheme tag expected at the front of an encryption descriptor.
pub const AES_GCM_SCHEME: &str = "aes-256-gcm";

/// Size of the AES-GCM nonce in bytes.
const NONCE_SIZE: usize = 12;

/// Errors that can occur during callback payload encryption.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("unsupported encryption scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid encrypted data: {0}")]
    InvalidEncryptedData(String),
}

/// A parsed per-subscription encryption key.
#[derive(Clone)]
pub struct CallbackEncryption {
    key: [u8; 32],
}

impl CallbackEncryption {
    /// Parses a descriptor string of the form `aes-256-gcm <base64 key>`.
    ///
    /// The scheme comparison is case-insensitive and the decoded key must
    /// be exactly 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the scheme is unknown or the key material is
    /// not a valid 32-byte base64 string.
    pub fn parse(descriptor: &str) -> Result<Self, EncryptionError> {
        let Some((scheme, key_b64)) = descriptor.split_once(' ') else {
            return Err(EncryptionError::UnsupportedScheme(descriptor.to_string()));
        };
        if !scheme.eq_ignore_ascii_case(AES_GCM_SCHEME) {
            return Err(EncryptionError::UnsupportedScheme(scheme.to_string()));
        }

        let key_bytes = BASE64
            .decode(key_b64.trim())
            .map_err(|e| EncryptionError::InvalidKey(format!("invalid base64: {}", e)))?;
        let key = <[u8; 32]>::try_from(key_bytes).map_err(|bytes| {
            EncryptionError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;

        Ok(Self { key })
    }

    /// The descriptor string this key round-trips through [`parse`].
    ///
    /// [`parse`]: CallbackEncryption::parse
    pub fn descriptor(&self) -> String {
        format!("{} {}", AES_GCM_SCHEME, BASE64.encode(self.key))
    }

    /// Encrypts a callback body, prepending the random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::EncryptionFailed`] if the cipher rejects
    /// the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypts a body produced by [`encrypt`].
    ///
    /// [`encrypt`]: CallbackEncryption::encrypt
    ///
    /// # Errors
    ///
    /// Returns an error when the data is too short to hold a nonce and
    /// authentication tag, or when authentication fails.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        // Nonce and GCM tag; an empty plaintext encrypts to exactly this.
        if data.len() < NONCE_SIZE + 16 {
            return Err(EncryptionError::InvalidEncryptedData(format!(
                "data too short: {} bytes",
                data.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
    }
}

impl std::fmt::Debug for CallbackEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackEncryption").finish_non_exhaustive()
    }
}
