// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use trainmovements_relay::errors::QueueError;

/// Errors that can occur when working with the listener services
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create queue client: {0}")]
    QueueClient(#[from] QueueError),

    #[error("Listener already started")]
    AlreadyStarted,

    #[error("Listener not running")]
    NotRunning,

    #[error("Shutdown timeout exceeded")]
    ShutdownTimeout,

    #[error("Runtime error: {0}")]
    Runtime(String),
}
