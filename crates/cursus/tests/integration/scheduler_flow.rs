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

//! Intake and scheduling behavior through the public engine surface.

use std::sync::Arc;
use std::time::Duration;

use tracing_test::traced_test;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use cursus::{
    NotificationConfig, NotificationEvent, NotificationKind, SystemClock, QUEUE_FULL_MESSAGE,
};

use crate::support::{
    build_pool, record, test_config, tx_id, wait_for, MemoryRepository, StaticProofs,
};

fn merkle_event(n: u8) -> NotificationEvent {
    NotificationEvent {
        kind: NotificationKind::MerkleProof,
        tx_external_id: tx_id(n),
        block_internal_id: Some(1),
        ds_tx_id: None,
    }
}

/// When the instant queue is full the event is refused and persisted as a
/// delivery error with a zero attempt count, so the sweep picks it up.
#[tokio::test]
#[traced_test]
async fn test_full_queue_refusal_is_persisted_for_retry() {
    let repository = Arc::new(MemoryRepository::new());
    for n in 1..=3 {
        repository.insert_record(record(n, "https://merchant.example/callback"));
    }

    let config = NotificationConfig {
        max_instant_queue_size: 2,
        ..test_config()
    };
    // No workers are started, so queued records stay queued.
    let (scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        config,
    );

    assert!(pool.enqueue(merkle_event(1)).await.unwrap());
    assert!(pool.enqueue(merkle_event(2)).await.unwrap());
    assert!(!pool.enqueue(merkle_event(3)).await.unwrap());
    assert!(logs_contain("Notification rejected by full queue"));

    assert_eq!(scheduler.pending_count(), 2);
    let errors = repository.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].tx_external_id, tx_id(3));
    assert_eq!(errors[0].kind, NotificationKind::MerkleProof);
    assert_eq!(errors[0].message, QUEUE_FULL_MESSAGE);
    assert_eq!(errors[0].error_count, 0);
}

/// Events for transactions with no registered callback are dropped without
/// touching the queue or the failed set.
#[tokio::test]
async fn test_unknown_event_is_ignored() {
    let repository = Arc::new(MemoryRepository::new());
    let (scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );

    assert!(!pool.enqueue(merkle_event(9)).await.unwrap());
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(repository.error_len(), 0);
}

/// A record whose callback URL cannot yield a host never enters the queue;
/// the rejection is persisted so the problem shows up in the failed set.
#[tokio::test]
async fn test_unusable_callback_url_is_rejected() {
    let repository = Arc::new(MemoryRepository::new());
    repository.insert_record(record(9, "not-a-callback-url"));

    let (scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );

    assert!(!pool.enqueue(merkle_event(9)).await.unwrap());
    assert_eq!(scheduler.pending_count(), 0);

    let errors = repository.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].tx_external_id, tx_id(9));
    assert!(errors[0].message.contains("invalid callback url"));
    assert_eq!(errors[0].error_count, 0);
}

/// Records queued for different hosts are all delivered; one endpoint
/// reached under two host names stands in for two merchants.
#[tokio::test]
async fn test_pipeline_delivers_across_hosts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let host_a = format!("{}/a", server.uri());
    let host_b = format!("http://localhost:{}/b", server.address().port());

    let repository = Arc::new(MemoryRepository::new());
    for n in 1..=3 {
        repository.insert_record(record(n, &host_a));
    }
    for n in 4..=5 {
        repository.insert_record(record(n, &host_b));
    }

    let (_scheduler, pool) = build_pool(
        repository.clone(),
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );
    let handles = pool.clone().start().await.unwrap();

    for n in 1..=5 {
        assert!(pool.enqueue(merkle_event(n)).await.unwrap());
    }
    wait_for(|| repository.sent_len() == 5, "all callbacks to be delivered").await;
    handles.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests.iter().filter(|r| r.url.path() == "/a").count(), 3);
    assert_eq!(requests.iter().filter(|r| r.url.path() == "/b").count(), 2);
}

/// Shutdown wakes workers parked on empty queues instead of hanging.
#[tokio::test]
async fn test_shutdown_wakes_parked_workers() {
    let repository = Arc::new(MemoryRepository::new());
    let (_scheduler, pool) = build_pool(
        repository,
        StaticProofs::none(),
        None,
        Arc::new(SystemClock),
        test_config(),
    );
    let handles = pool.clone().start().await.unwrap();

    // Give the workers time to park on the empty scheduler.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio::time::timeout(Duration::from_secs(5), handles.shutdown())
        .await
        .expect("shutdown should complete promptly");
}
