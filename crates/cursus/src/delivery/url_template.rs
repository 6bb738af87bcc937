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

//! Callback URL handling: reason placeholder substitution and host keys.

use url::Url;

use super::DeliveryError;

/// Placeholder merchants may embed in their callback URL; replaced with the
/// notification kind before sending. Matched case-insensitively.
pub const CALLBACK_REASON_PLACEHOLDER: &str = "{callbackreason}";

/// Substitutes the callback reason placeholder wherever it appears.
///
/// The placeholder is located case-insensitively; every occurrence written
/// with the same casing as the first match is replaced. URLs without the
/// placeholder pass through unchanged.
///
/// # Example
///
/// ```rust
/// use cursus::format_callback_url;
///
/// let url = format_callback_url("https://merchant.example/{callbackReason}/v1", "merkleProof");
/// assert_eq!(url, "https://merchant.example/merkleProof/v1");
/// ```
pub fn format_callback_url(callback_url: &str, reason: &str) -> String {
    match callback_url
        .to_ascii_lowercase()
        .find(CALLBACK_REASON_PLACEHOLDER)
    {
        Some(index) => {
            let matched = &callback_url[index..index + CALLBACK_REASON_PLACEHOLDER.len()];
            callback_url.replace(matched, reason)
        }
        None => callback_url.to_string(),
    }
}

/// Derives the host key (lowercased hostname) from a callback URL.
///
/// # Errors
///
/// Returns [`DeliveryError::InvalidCallbackUrl`] when the URL does not parse
/// or has no host component.
pub fn callback_host(callback_url: &str) -> Result<String, DeliveryError> {
    let parsed = Url::parse(callback_url).map_err(|e| DeliveryError::InvalidCallbackUrl {
        url: callback_url.to_string(),
        reason: e.to_string(),
    })?;
    parsed
        .host_str()
        .map(|host| host.to_ascii_lowercase())
        .ok_or_else(|| DeliveryError::InvalidCallbackUrl {
            url: callback_url.to_string(),
            reason: "no host component".to_string(),
        })
}
