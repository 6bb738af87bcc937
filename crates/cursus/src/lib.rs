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

//! # Cursus
//!
//! Host-fair, backpressure-aware delivery of merchant callbacks for a
//! transaction relay gateway.
//!
//! When a relayed transaction hits a life-cycle event (a merkle proof
//! becomes available, a double spend is detected), the merchant who
//! submitted it gets an HTTP callback. Cursus owns everything between the
//! event and the merchant's 2xx: per-host queueing, fair dispatch across
//! hosts, slow-host isolation, payload signing and encryption, and retry
//! of failed deliveries.
//!
//! ## Architecture
//!
//! ```text
//!  enqueue(event)                    take_batch()
//!  ──────────────▶ NotificationScheduler ◀────────── DeliveryWorkerPool
//!                  per-host FIFO queues              fast + slow workers
//!                  fast / slow dispatch tracks               │
//!                  rolling response times                    ▼
//!                                                    sign ▸ encrypt ▸ POST
//!                  NotificationRepository ◀───────── outcome persisted
//!                       failed set  ▲
//!                                   └── RetrySweeper re-attempts on a timer
//! ```
//!
//! The scheduler queues records per callback host and serves workers whole
//! host batches, round-robin across hosts. Hosts whose rolling mean
//! response time exceeds a threshold are classified slow and served only
//! by a reserved share of the workers, with their own queue quota, so one
//! degraded merchant endpoint cannot starve the rest. When queues are
//! empty a worker parks on the scheduler until work arrives; when queues
//! are full the scheduler refuses new records and the refusal is persisted
//! for the retry sweep. Memory is bounded and the repository is the
//! durable side of the at-least-once contract.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use cursus::{
//!     DeliveryWorkerPool, NotificationConfig, NotificationScheduler, RetrySweeper, SystemClock,
//! };
//!
//! let config = NotificationConfig::default();
//! config.validate()?;
//!
//! let scheduler = Arc::new(NotificationScheduler::new(&config));
//! let pool = Arc::new(DeliveryWorkerPool::new(
//!     scheduler,
//!     repository.clone(), // your NotificationRepository
//!     proofs,             // your ProofProvider
//!     Some(signer),       // optional payload signer
//!     Arc::new(SystemClock),
//!     config.clone(),
//! ));
//!
//! let handles = pool.clone().start().await?;
//! let sweeper = RetrySweeper::new(pool.clone(), repository, config);
//! let sweeper_handle = sweeper.start(handles.cancellation_token());
//!
//! // as life-cycle events arrive
//! pool.enqueue(event).await?;
//!
//! // on shutdown
//! handles.shutdown().await;
//! let _ = sweeper_handle.await;
//! ```

pub mod clock;
pub mod config;
pub mod delivery;
pub mod model;
pub mod scheduler;
pub mod sweeper;
pub mod traits;

pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, NotificationConfig};
pub use delivery::{
    format_callback_url, CallbackClient, DeliveryError, DeliveryHandles, DeliveryWorkerPool,
    QUEUE_FULL_MESSAGE,
};
pub use model::{
    MerkleFormat, NotificationEvent, NotificationKind, NotificationRecord, TxId,
};
pub use scheduler::NotificationScheduler;
pub use sweeper::RetrySweeper;
pub use traits::{
    NotificationRepository, ProofProvider, RepositoryError, SignaturePack, Signer,
};
