// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the relay pipeline.

/// The envelope body is not a JSON array of records.
#[derive(Debug, thiserror::Error)]
#[error("envelope is not a JSON array of records: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Failure while relaying the records of one envelope.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to send batch to queue: {0}")]
    Queue(#[from] QueueError),
}

/// Failure of a single `send_batch` call to the queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Batch of {count} entries exceeds the queue limit of {max}")]
    TooManyEntries { count: usize, max: usize },

    #[error("Invalid queue endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to build request payload: {0}")]
    Payload(serde_json::Error),

    #[error("Failed to sign request: {0}")]
    Signing(String),

    #[error("Request to queue failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Queue responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse queue response: {0}")]
    Response(serde_json::Error),
}

/// Failure on the STOMP feed connection.
#[derive(Debug, thiserror::Error)]
pub enum StompError {
    #[error("I/O error on feed connection: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed STOMP frame: {0}")]
    MalformedFrame(String),

    #[error("STOMP frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("Feed rejected the connection: {0}")]
    Rejected(String),

    #[error("Unexpected {0} frame")]
    UnexpectedFrame(String),

    #[error("Feed connection closed by server")]
    ConnectionClosed,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}
