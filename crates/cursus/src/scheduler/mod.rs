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

//! Host-fair scheduling of pending notifications.
//!
//! This module provides:
//! - Per-host FIFO queues with backpressure accounting
//! - Two fair dispatch tracks (fast, slow) matching ready hosts to waiting
//!   workers
//! - Rolling execution-time windows that classify hosts
//! - The [`NotificationScheduler`] tying them together under one lock

mod dispatch_track;
mod execution_times;
mod host_queues;
mod notification_scheduler;

pub use notification_scheduler::NotificationScheduler;
