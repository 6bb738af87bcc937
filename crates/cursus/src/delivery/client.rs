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

//! Per-host HTTP client used to deliver callback batches.
//!
//! A fresh client is built for each batch so connection state never
//! outlives the batch that created it. Timeouts are applied per request;
//! a slow host gets the longer timeout for every request in its batch.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use super::DeliveryError;

/// HTTP client bound to a single callback host.
pub struct CallbackClient {
    host: String,
    http: reqwest::Client,
}

impl CallbackClient {
    /// Builds a client for the given host.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Http`] if the underlying client cannot be
    /// constructed.
    pub fn build(host: String) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { host, http })
    }

    /// The host this client delivers to, lowercase.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Posts a JSON callback body.
    pub async fn post_json(
        &self,
        url: &str,
        token: Option<&str>,
        body: String,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        self.post(url, token, "application/json", body, timeout).await
    }

    /// Posts an encrypted callback body as a binary payload.
    pub async fn post_octet_stream(
        &self,
        url: &str,
        token: Option<&str>,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        self.post(url, token, "application/octet-stream", body, timeout)
            .await
    }

    async fn post(
        &self,
        url: &str,
        token: Option<&str>,
        content_type: &'static str,
        body: impl Into<reqwest::Body>,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .timeout(timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}
