// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{config::RelayConfig, error::ListenerError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use trainmovements_relay::constants::BYTES_PER_MEGABYTE;
use trainmovements_relay::feed::FeedConnection;
use trainmovements_relay::queue::QueueSender;
use trainmovements_relay::relay::RelayHandler;
use trainmovements_relay::sqs::SqsQueueSender;

/// Status of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Starting,
    /// The feed connection is up or being re-established.
    Running,
    /// Cancellation requested; the in-flight notification is being drained.
    Stopping,
    Stopped,
}

/// Handle to the running listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    status: Arc<RwLock<ServiceStatus>>,
    status_tx: broadcast::Sender<ServiceStatus>,
    cancel_token: CancellationToken,
}

impl ListenerHandle {
    pub async fn status(&self) -> ServiceStatus {
        *self.status.read().await
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.status.read().await, ServiceStatus::Running)
    }

    /// Get a receiver for status updates.
    pub fn status_receiver(&self) -> broadcast::Receiver<ServiceStatus> {
        self.status_tx.subscribe()
    }

    /// Requests shutdown. Calling it again, or after the listener stopped, is a no-op.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        let mut status = self.status.write().await;
        if matches!(*status, ServiceStatus::Stopping | ServiceStatus::Stopped) {
            return Ok(());
        }

        *status = ServiceStatus::Stopping;
        drop(status);

        let _ = self.status_tx.send(ServiceStatus::Stopping);
        self.cancel_token.cancel();
        Ok(())
    }

    /// Waits until the listener has stopped, for at most `timeout`.
    pub async fn wait_stopped(&self, timeout: Duration) -> Result<(), ListenerError> {
        let mut status_rx = self.status_tx.subscribe();
        let wait = async {
            loop {
                if *self.status.read().await == ServiceStatus::Stopped {
                    return;
                }
                match status_rx.recv().await {
                    Ok(ServiceStatus::Stopped) | Err(broadcast::error::RecvError::Closed) => {
                        return
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ListenerError::ShutdownTimeout)
    }
}

/// Runs the feed connection and relay for one configuration.
#[derive(Debug)]
pub struct ListenerServices {
    config: RelayConfig,
    handle: Option<ListenerHandle>,
}

impl ListenerServices {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    /// Builds the queue client and relay, then spawns the feed connection.
    pub async fn start(&mut self) -> Result<ListenerHandle, ListenerError> {
        if self.handle.is_some() {
            return Err(ListenerError::AlreadyStarted);
        }
        self.config.validate()?;

        let sender: Arc<dyn QueueSender> = Arc::new(SqsQueueSender::new(self.config.sqs_config())?);
        debug!("Queue client ready for {}", self.config.queue_url);

        let handle = spawn_listener(&self.config, RelayHandler::new(sender));
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Handle of the started listener.
    pub fn handle(&self) -> Result<ListenerHandle, ListenerError> {
        self.handle.clone().ok_or(ListenerError::NotRunning)
    }
}

fn spawn_listener(config: &RelayConfig, handler: RelayHandler) -> ListenerHandle {
    let status = Arc::new(RwLock::new(ServiceStatus::Starting));
    let (status_tx, _status_rx) = broadcast::channel(16);
    let cancel_token = CancellationToken::new();

    let handle = ListenerHandle {
        status: Arc::clone(&status),
        status_tx: status_tx.clone(),
        cancel_token: cancel_token.clone(),
    };

    let connection = FeedConnection::new(config.feed_config(), handler, cancel_token);
    let feed_task = tokio::spawn(connection.spin());

    tokio::spawn(async move {
        {
            let mut s = status.write().await;
            if *s == ServiceStatus::Starting {
                *s = ServiceStatus::Running;
                let _ = status_tx.send(ServiceStatus::Running);
            }
        }

        match feed_task.await {
            Ok(handler) => info!(
                "Shutting down, relayed {} messages, ~{:.3} MB",
                handler.sent_message_count(),
                handler.sent_bytes() as f64 / BYTES_PER_MEGABYTE
            ),
            Err(e) => error!("{}", ListenerError::Runtime(format!("feed task failed: {e}"))),
        }

        // Mark as stopped on any exit path
        *status.write().await = ServiceStatus::Stopped;
        let _ = status_tx.send(ServiceStatus::Stopped);
    });

    handle
}
