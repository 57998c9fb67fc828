// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups pushed items into bounded batches for a flush operation.
//!
//! A [`Batcher`] is opened with [`Batcher::new`] and must be closed with
//! [`Batcher::close`] or [`Batcher::finish`]. Closing flushes whatever is still
//! pending, so a partial tail batch is never lost on either the success or the error
//! path of the code pushing into it:
//!
//! ```rust,ignore
//! let mut batcher = Batcher::new(flusher, MAX_BATCH_SIZE);
//! let outcome = push_everything(&mut batcher).await;
//! batcher.finish(outcome).await?;
//! ```

use async_trait::async_trait;
use std::fmt::Display;
use std::num::NonZeroUsize;
use tracing::{debug, error, warn};

/// Destination of full (or final partial) batches.
///
/// Never called with an empty batch, nor with more items than the batcher's maximum.
#[async_trait]
pub trait BatchFlusher<T: Send + 'static>: Send {
    type Error: Display + Send;

    async fn flush(&mut self, batch: Vec<T>) -> Result<(), Self::Error>;
}

/// Accumulates items and hands them to a [`BatchFlusher`] in insertion order.
pub struct Batcher<T: Send + 'static, F: BatchFlusher<T>> {
    flusher: F,
    max_batch_size: NonZeroUsize,
    pending: Vec<T>,
}

impl<T: Send + 'static, F: BatchFlusher<T>> Batcher<T, F> {
    pub fn new(flusher: F, max_batch_size: NonZeroUsize) -> Self {
        Batcher {
            flusher,
            max_batch_size,
            pending: Vec::with_capacity(max_batch_size.get()),
        }
    }

    /// Number of items waiting for the next flush.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Appends an item, flushing synchronously once the batch is full.
    ///
    /// A flush error is returned to the caller. The batch that failed is not kept.
    pub async fn push(&mut self, item: T) -> Result<(), F::Error> {
        self.pending.push(item);
        if self.pending.len() >= self.max_batch_size.get() {
            self.flush_pending().await?;
        }
        Ok(())
    }

    /// Flushes the pending tail batch, if any, and releases the batcher.
    pub async fn close(mut self) -> Result<(), F::Error> {
        self.flush_pending().await
    }

    /// Closes the batcher after the code pushing into it has finished.
    ///
    /// The pending tail is flushed whatever `outcome` is. An error from `outcome` takes
    /// precedence over an error from the final flush, which is then only logged.
    pub async fn finish<R, E>(self, outcome: Result<R, E>) -> Result<R, E>
    where
        E: From<F::Error>,
    {
        match (outcome, self.close().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_error)) => Err(close_error.into()),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(close_error)) => {
                error!("Failed to flush final batch after an earlier error: {close_error}");
                Err(error)
            }
        }
    }

    async fn flush_pending(&mut self) -> Result<(), F::Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.max_batch_size.get()),
        );
        debug!("Flushing batch of {} items", batch.len());
        self.flusher.flush(batch).await
    }
}

impl<T: Send + 'static, F: BatchFlusher<T>> Drop for Batcher<T, F> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Batcher dropped without being closed, discarding {} unflushed items",
                self.pending.len()
            );
        }
    }
}
