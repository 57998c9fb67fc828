// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Train movements relay
//!
//! Relays train movement records from a STOMP topic to an SQS queue.
//!
//! ## Pipeline
//!
//! ```text
//!   FeedConnection ──> RelayHandler ──> Batcher ──> QueueFlusher ──> QueueSender
//!     (STOMP)          (decode, id,      (groups of   (per-item        (SQS
//!                       serialize)        10 items)    result check)    SendMessageBatch)
//! ```
//!
//! - [`feed`]: connects, authenticates and subscribes to the feed, then hands each
//!   notification to a [`feed::FeedListener`] one at a time.
//! - [`relay`]: decodes an envelope into records and pushes one outbound item per record.
//! - [`batcher`]: groups pushed items into bounded batches and flushes the tail on close.
//! - [`queue`]: the queue sender interface and the flush operation bridging the two.
//! - [`sqs`]: the SQS implementation of the queue sender.
//!
//! Delivery is at-least-once at best: items a queue reports as failed are logged and
//! not retried.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batcher;
pub mod constants;
pub mod errors;
pub mod feed;
pub mod logger;
pub mod queue;
pub mod record;
pub mod relay;
pub mod sigv4;
pub mod sqs;
pub mod stomp;

#[cfg(test)]
pub(crate) mod test_support;
