// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue sender interface and the flush operation feeding it.

use crate::batcher::BatchFlusher;
use crate::errors::QueueError;
use crate::record::OutboundItem;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

/// Per-item result of one `send_batch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendBatchOutcome {
    #[serde(default)]
    pub successful: Vec<SentEntry>,
    #[serde(default)]
    pub failed: Vec<FailedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SentEntry {
    pub id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default, rename = "MD5OfMessageBody")]
    pub md5_of_message_body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailedEntry {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sender_fault: bool,
}

/// A durable queue accepting batches of up to ten entries per call.
#[async_trait]
pub trait QueueSender: Send + Sync {
    /// Sends `entries` in one call. Per-entry failures are reported in the outcome,
    /// call-level failures as an error.
    async fn send_batch(&self, entries: &[OutboundItem]) -> Result<SendBatchOutcome, QueueError>;
}

/// Flushes batches to a [`QueueSender`] and reports entries it did not accept.
///
/// Failed entries are logged with the full outcome and not retried.
pub struct QueueFlusher {
    sender: Arc<dyn QueueSender>,
}

impl QueueFlusher {
    pub fn new(sender: Arc<dyn QueueSender>) -> Self {
        QueueFlusher { sender }
    }
}

#[async_trait]
impl BatchFlusher<OutboundItem> for QueueFlusher {
    type Error = QueueError;

    async fn flush(&mut self, batch: Vec<OutboundItem>) -> Result<(), QueueError> {
        let outcome = self.sender.send_batch(&batch).await?;

        if outcome.successful.len() < batch.len() {
            error!("Some messages failed to send to queue: {:?}", outcome);
        } else {
            debug!("Queue accepted all {} messages of the batch", batch.len());
        }
        Ok(())
    }
}
