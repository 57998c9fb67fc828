// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Test doubles shared by the unit tests.

use crate::batcher::BatchFlusher;
use crate::errors::QueueError;
use crate::queue::{FailedEntry, QueueSender, SendBatchOutcome, SentEntry};
use crate::record::OutboundItem;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Records every batch it is given; optionally fails on the n-th call (1-based).
#[derive(Clone, Default)]
pub(crate) struct RecordingFlusher {
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
    fail_on_call: Option<usize>,
}

impl RecordingFlusher {
    pub(crate) fn failing_on_call(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Default::default()
        }
    }

    pub(crate) fn batches(&self) -> Vec<Vec<u32>> {
        self.batches.lock().expect("lock poisoned").clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.batches.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl BatchFlusher<u32> for RecordingFlusher {
    type Error = String;

    async fn flush(&mut self, batch: Vec<u32>) -> Result<(), String> {
        let call = {
            let mut batches = self.batches.lock().expect("lock poisoned");
            batches.push(batch);
            batches.len()
        };
        if self.fail_on_call == Some(call) {
            return Err(format!("flush {call} failed"));
        }
        Ok(())
    }
}

type Responder =
    Box<dyn Fn(usize, &[OutboundItem]) -> Result<SendBatchOutcome, QueueError> + Send + Sync>;

/// Queue sender that records each call and answers through a responder closure.
///
/// The responder receives the 1-based call number and the entries of that call.
pub(crate) struct StubQueueSender {
    calls: Mutex<Vec<Vec<OutboundItem>>>,
    responder: Responder,
}

impl StubQueueSender {
    /// Reports every entry as sent.
    pub(crate) fn accepting() -> Self {
        Self::with_responder(|_, entries| Ok(all_successful(entries)))
    }

    pub(crate) fn with_responder<R>(responder: R) -> Self
    where
        R: Fn(usize, &[OutboundItem]) -> Result<SendBatchOutcome, QueueError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<OutboundItem>> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl QueueSender for StubQueueSender {
    async fn send_batch(&self, entries: &[OutboundItem]) -> Result<SendBatchOutcome, QueueError> {
        let call = {
            let mut calls = self.calls.lock().expect("lock poisoned");
            calls.push(entries.to_vec());
            calls.len()
        };
        (self.responder)(call, entries)
    }
}

pub(crate) fn all_successful(entries: &[OutboundItem]) -> SendBatchOutcome {
    SendBatchOutcome {
        successful: entries
            .iter()
            .map(|entry| SentEntry {
                id: entry.id.clone(),
                message_id: None,
                md5_of_message_body: None,
            })
            .collect(),
        failed: Vec::new(),
    }
}

/// Reports the entry at `index` as failed with `code`, every other entry as sent.
pub(crate) fn failing_entry(entries: &[OutboundItem], index: usize, code: &str) -> SendBatchOutcome {
    let mut outcome = all_successful(entries);
    let failed = outcome.successful.remove(index);
    outcome.failed.push(FailedEntry {
        id: failed.id,
        code: Some(code.to_string()),
        message: None,
        sender_fault: false,
    });
    outcome
}
