// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns feed notifications into batched queue sends.

use crate::batcher::Batcher;
use crate::constants::{BYTES_PER_MEGABYTE, LOG_EVERY_N_MESSAGES, MAX_BATCH_SIZE};
use crate::errors::RelayError;
use crate::feed::{FeedHeaders, FeedListener};
use crate::queue::{QueueFlusher, QueueSender};
use crate::record::{decode_envelope, OutboundItem, Record};
use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Relays every record of every envelope to a queue, ten at a time.
///
/// Errors never escape [`RelayHandler::on_message`]: a malformed envelope or a failed
/// send is logged and the handler carries on with the next notification.
pub struct RelayHandler {
    sender: Arc<dyn QueueSender>,
    max_batch_size: NonZeroUsize,
    sent_message_count: u64,
    sent_bytes: u64,
}

impl RelayHandler {
    pub fn new(sender: Arc<dyn QueueSender>) -> Self {
        Self::with_max_batch_size(sender, MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(sender: Arc<dyn QueueSender>, max_batch_size: NonZeroUsize) -> Self {
        RelayHandler {
            sender,
            max_batch_size,
            sent_message_count: 0,
            sent_bytes: 0,
        }
    }

    /// Records pushed towards the queue so far, whether or not the queue accepted them.
    pub fn sent_message_count(&self) -> u64 {
        self.sent_message_count
    }

    /// Sum of the original encoded sizes of the records counted by `sent_message_count`.
    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    /// Handles one feed notification.
    pub async fn on_message(&mut self, headers: &FeedHeaders, body: &[u8]) {
        debug!("STOMP headers {:?}", headers);

        let records = match decode_envelope(body) {
            Ok(records) => records,
            Err(e) => {
                error!(
                    "Failed to decode {} bytes as JSON: {}: {}",
                    body.len(),
                    String::from_utf8_lossy(body),
                    e
                );
                return;
            }
        };

        if let Err(e) = self.handle_records(records).await {
            error!("Failed to relay envelope: {}", e);
        }
    }

    /// Handles a transport-level error notification from the feed.
    pub async fn on_error(&mut self, headers: &FeedHeaders, message: &[u8]) {
        error!(
            "Feed error: {:?} {}",
            headers,
            String::from_utf8_lossy(message)
        );
    }

    /// Sends `records` in order, flushing the tail batch whether or not pushing fails.
    pub async fn handle_records(&mut self, records: Vec<Record>) -> Result<(), RelayError> {
        let mut batcher = Batcher::new(QueueFlusher::new(self.sender.clone()), self.max_batch_size);
        let outcome = self.push_records(&mut batcher, &records).await;
        batcher.finish(outcome).await
    }

    async fn push_records(
        &mut self,
        batcher: &mut Batcher<OutboundItem, QueueFlusher>,
        records: &[Record],
    ) -> Result<(), RelayError> {
        for record in records {
            let item = record.to_outbound_item()?;
            debug!("Sending to queue with id {}: {}", item.id, item.message_body);

            batcher.push(item).await?;
            self.increment_message_counter(record.encoded_len());
        }
        Ok(())
    }

    fn increment_message_counter(&mut self, num_bytes: usize) {
        self.sent_message_count += 1;
        self.sent_bytes += num_bytes as u64;

        if self.sent_message_count % LOG_EVERY_N_MESSAGES == 0 {
            info!(
                "Sent {} messages, ~{:.3} MB",
                self.sent_message_count,
                self.sent_bytes as f64 / BYTES_PER_MEGABYTE
            );
        }
    }
}

#[async_trait]
impl FeedListener for RelayHandler {
    async fn on_message(&mut self, headers: &FeedHeaders, body: &[u8]) {
        RelayHandler::on_message(self, headers, body).await;
    }

    async fn on_error(&mut self, headers: &FeedHeaders, message: &[u8]) {
        RelayHandler::on_error(self, headers, message).await;
    }
}
