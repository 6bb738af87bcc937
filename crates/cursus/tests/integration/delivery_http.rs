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

//! End-to-end delivery tests against a mock merchant endpoint.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{TimeZone, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cursus::delivery::{
    verify_signed_envelope, CallbackEncryption, CallbackEnvelope, KeypairSigner, SignedEnvelope,
    AES_GCM_SCHEME,
};
use cursus::{NotificationConfig, NotificationEvent, NotificationKind, SystemClock};

use crate::support::{
    build_pool, record, test_config, tx_id, wait_for, FixedClock, MemoryRepository, StaticProofs,
};

fn merkle_event(n: u8) -> NotificationEvent {
    NotificationEvent {
        kind: NotificationKind::MerkleProof,
        tx_external_id: tx_id(n),
        block_internal_id: Some(1),
        ds_tx_id: None,
    }
}

/// A signed delivery posts a verifiable envelope with the bearer token and
/// ends up marked sent with the delivery timestamp.
#[tokio::test]
async fn test_signed_callback_is_delivered_and_marked_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let repository = Arc::new(MemoryRepository::new());
    let mut seeded = record(1, &format!("{}/callback", server.uri()));
    seeded.callback_token = Some("merchant-token".to_string());
    repository.insert_record(seeded);

    let signer = Arc::new(KeypairSigner::generate());
    let sent_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let (_scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        Some(signer.clone()),
        Arc::new(FixedClock(sent_at)),
        test_config(),
    );

    let handles = pool.clone().start().await.unwrap();
    assert_eq!(repository.reset_calls.load(Ordering::SeqCst), 1);

    assert!(pool.enqueue(merkle_event(1)).await.unwrap());
    wait_for(|| repository.sent_len() == 1, "callback to be marked sent").await;
    handles.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(
        request.headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer merchant-token"
    );
    assert_eq!(
        request.headers.get("content-type").unwrap().to_str().unwrap(),
        "application/json"
    );

    let signed: SignedEnvelope = serde_json::from_slice(&request.body).unwrap();
    assert!(verify_signed_envelope(&signed));
    assert_eq!(signed.public_key.as_deref(), Some(signer.identity()));
    assert_eq!(signed.encoding, "UTF-8");
    assert_eq!(signed.mimetype, "application/json");

    let envelope: CallbackEnvelope = serde_json::from_str(&signed.payload).unwrap();
    assert_eq!(envelope.callback_reason, "merkleProof");
    assert_eq!(envelope.callback_tx_id, tx_id(1).to_hex());
    assert_eq!(envelope.miner_id.as_deref(), Some(signer.identity()));
    assert_eq!(envelope.timestamp, sent_at);
    assert_eq!(envelope.block_hash, tx_id(0xbb).to_hex());
    assert_eq!(envelope.block_height, 10);
    assert_eq!(envelope.callback_payload, serde_json::json!({ "proof": 1 }));

    let outcome = repository.sent.lock()[0].clone();
    assert_eq!(outcome.kind, NotificationKind::MerkleProof);
    assert_eq!(outcome.tx_internal_id, 1);
    assert_eq!(outcome.block_internal_id, Some(1));
    assert_eq!(outcome.ds_tx_id, None);
    assert_eq!(outcome.sent_at, sent_at);
}

/// Without a signer the envelope is posted bare, with no miner identity and
/// no signature wrapper.
#[tokio::test]
async fn test_unsigned_callback_posts_the_bare_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let repository = Arc::new(MemoryRepository::new());
    repository.insert_record(record(3, &server.uri()));

    let (_scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );
    let handles = pool.clone().start().await.unwrap();

    assert!(pool.enqueue(merkle_event(3)).await.unwrap());
    wait_for(|| repository.sent_len() == 1, "callback to be marked sent").await;
    handles.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    let envelope: CallbackEnvelope = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(envelope.miner_id, None);
    assert_eq!(envelope.callback_tx_id, tx_id(3).to_hex());

    let as_value: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(as_value.get("signature").is_none());
}

/// A server error is persisted as a delivery error with a bumped attempt
/// count, and nothing is marked sent.
#[tokio::test]
async fn test_server_error_is_recorded_against_the_notification() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let repository = Arc::new(MemoryRepository::new());
    repository.insert_record(record(4, &server.uri()));

    let (_scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );
    let handles = pool.clone().start().await.unwrap();

    assert!(pool.enqueue(merkle_event(4)).await.unwrap());
    wait_for(|| repository.error_len() == 1, "delivery error to be recorded").await;
    handles.shutdown().await;

    let error = repository.errors.lock()[0].clone();
    assert_eq!(error.tx_external_id, tx_id(4));
    assert_eq!(error.kind, NotificationKind::MerkleProof);
    assert_eq!(error.error_count, 1);
    assert!(error.message.contains("500"));
    assert_eq!(repository.sent_len(), 0);
}

/// The callback reason placeholder in a subscription URL is substituted
/// before posting.
#[tokio::test]
async fn test_callback_reason_placeholder_is_substituted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify/merkleProof"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let repository = Arc::new(MemoryRepository::new());
    repository.insert_record(record(
        5,
        &format!("{}/notify/{{callbackReason}}", server.uri()),
    ));

    let (_scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );
    let handles = pool.clone().start().await.unwrap();

    assert!(pool.enqueue(merkle_event(5)).await.unwrap());
    wait_for(|| repository.sent_len() == 1, "callback to be marked sent").await;
    handles.shutdown().await;
}

/// Double-spend notifications are enriched with the competing transaction
/// before delivery.
#[tokio::test]
async fn test_double_spend_callback_carries_the_competing_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let repository = Arc::new(MemoryRepository::new());
    let mut seeded = record(6, &server.uri());
    seeded.kind = NotificationKind::DoubleSpend;
    seeded.payload = None;
    seeded.ds_tx_id = Some(tx_id(0xee));
    seeded.block_hash = None;
    seeded.block_height = -1;
    repository.insert_record(seeded);

    let proofs = Arc::new(StaticProofs {
        ds_payload: Some(vec![1, 2, 3]),
        proof: None,
    });
    let (_scheduler, pool) = build_pool(
        repository.clone(),
        proofs,
        None,
        Arc::new(SystemClock),
        test_config(),
    );
    let handles = pool.clone().start().await.unwrap();

    let queued = pool
        .enqueue(NotificationEvent {
            kind: NotificationKind::DoubleSpend,
            tx_external_id: tx_id(6),
            block_internal_id: None,
            ds_tx_id: Some(tx_id(0xee)),
        })
        .await
        .unwrap();
    assert!(queued);

    wait_for(|| repository.sent_len() == 1, "callback to be marked sent").await;
    handles.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    let envelope: CallbackEnvelope = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(envelope.callback_reason, "doubleSpend");
    assert_eq!(envelope.block_hash, "");
    assert_eq!(envelope.block_height, -1);
    assert_eq!(
        envelope.callback_payload,
        serde_json::json!({ "doubleSpendTxId": tx_id(0xee).to_hex(), "payload": "010203" })
    );

    assert_eq!(repository.sent.lock()[0].ds_tx_id, Some(tx_id(0xee)));
}

/// A subscription with an encryption key gets its body encrypted and posted
/// as a binary payload.
#[tokio::test]
async fn test_encrypted_callback_posts_octet_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let descriptor = format!("{} {}", AES_GCM_SCHEME, BASE64.encode([7u8; 32]));
    let repository = Arc::new(MemoryRepository::new());
    let mut seeded = record(7, &server.uri());
    seeded.callback_encryption = Some(descriptor.clone());
    repository.insert_record(seeded);

    let (_scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );
    let handles = pool.clone().start().await.unwrap();

    assert!(pool.enqueue(merkle_event(7)).await.unwrap());
    wait_for(|| repository.sent_len() == 1, "callback to be marked sent").await;
    handles.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    assert_eq!(
        request.headers.get("content-type").unwrap().to_str().unwrap(),
        "application/octet-stream"
    );

    let plaintext = CallbackEncryption::parse(&descriptor)
        .unwrap()
        .decrypt(&request.body)
        .unwrap();
    let envelope: CallbackEnvelope = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(envelope.callback_tx_id, tx_id(7).to_hex());
}

/// A host that keeps timing out is reclassified slow from the recorded
/// response times.
#[tokio::test]
async fn test_timeouts_reclassify_the_host_as_slow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let repository = Arc::new(MemoryRepository::new());
    repository.insert_record(record(8, &server.uri()));

    let config = NotificationConfig {
        fast_host_timeout_ms: 50,
        slow_host_threshold_ms: 10,
        ..test_config()
    };
    let (scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        config,
    );
    let handles = pool.clone().start().await.unwrap();

    assert!(pool.enqueue(merkle_event(8)).await.unwrap());
    wait_for(|| repository.error_len() == 1, "timeout to be recorded").await;
    handles.shutdown().await;

    assert!(scheduler.is_host_slow("127.0.0.1"));
    assert_eq!(repository.sent_len(), 0);
}
