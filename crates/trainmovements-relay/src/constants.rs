// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::num::NonZeroUsize;
use std::time::Duration;

/// Maximum number of entries SQS accepts in a single `SendMessageBatch` call.
pub const SQS_MAX_BATCH_ENTRIES: usize = 10;

/// Number of outbound items grouped into one queue call.
pub const MAX_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(SQS_MAX_BATCH_ENTRIES) {
    Some(size) => size,
    None => unreachable!(),
};

/// A progress event is logged each time this many records have been relayed.
pub const LOG_EVERY_N_MESSAGES: u64 = 1000;

pub const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

pub const DEFAULT_FEED_HOST: &str = "datafeeds.networkrail.co.uk";
pub const DEFAULT_FEED_PORT: u16 = 61618;
pub const DEFAULT_FEED_TOPIC: &str = "TRAIN_MVT_ALL_TOC";
pub const DEFAULT_SUBSCRIPTION_ID: &str = "1";

pub const DEFAULT_AWS_REGION: &str = "eu-west-1";

pub const FEED_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const FEED_RECONNECT_BASE_BACKOFF: Duration = Duration::from_secs(1);
pub const FEED_RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(60);
/// How long to wait for the RECEIPT of a DISCONNECT before dropping the connection.
pub const FEED_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const FEED_DISCONNECT_RECEIPT_ID: &str = "disconnect";

pub const QUEUE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Frames larger than this are treated as a broken stream.
pub const MAX_STOMP_FRAME_SIZE: usize = 8 * 1024 * 1024;

pub const DEFAULT_LOG_DIR: &str = "/var/log/train-movements-listener";
/// Every event at DEBUG and above.
pub const DEBUG_LOG_FILE_NAME: &str = "debug.log";
pub const DEBUG_LOG_MAX_BYTES: u64 = 10 * 1024 * 1024;
/// Every event at WARN and above.
pub const WARNING_LOG_FILE_NAME: &str = "warning.log";
pub const WARNING_LOG_MAX_BYTES: u64 = 100 * 1024 * 1024;
/// Rotated files kept next to each active log file.
pub const LOG_FILE_BACKUPS: usize = 1;
