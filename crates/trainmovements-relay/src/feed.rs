// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection to the STOMP feed.
//!
//! [`FeedConnection::spin`] connects, logs in and subscribes to the topic, then hands
//! each notification to a [`FeedListener`]. A notification is processed to completion
//! before the next frame is read. Lost connections are re-established with exponential
//! backoff until the cancellation token fires.

use crate::constants::{
    DEFAULT_SUBSCRIPTION_ID, FEED_CONNECT_TIMEOUT, FEED_DISCONNECT_RECEIPT_ID,
    FEED_DISCONNECT_TIMEOUT, FEED_RECONNECT_BASE_BACKOFF, FEED_RECONNECT_MAX_BACKOFF,
};
use crate::errors::StompError;
use crate::stomp::{Command, Frame, StompCodec};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type FeedHeaders = BTreeMap<String, String>;

type FeedStream = Framed<TcpStream, StompCodec>;

/// Receives notifications from the feed, one at a time.
#[async_trait]
pub trait FeedListener: Send {
    /// Called once per MESSAGE frame.
    async fn on_message(&mut self, headers: &FeedHeaders, body: &[u8]);

    /// Called once per ERROR frame.
    async fn on_error(&mut self, headers: &FeedHeaders, message: &[u8]);
}

#[derive(Clone)]
pub struct FeedConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Topic name, subscribed to as `/topic/{topic}`.
    pub topic: String,
    pub subscription_id: String,
    pub connect_timeout: Duration,
    pub reconnect_base_backoff: Duration,
    pub reconnect_max_backoff: Duration,
}

impl FeedConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        FeedConfig {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            topic: topic.into(),
            subscription_id: DEFAULT_SUBSCRIPTION_ID.to_string(),
            connect_timeout: FEED_CONNECT_TIMEOUT,
            reconnect_base_backoff: FEED_RECONNECT_BASE_BACKOFF,
            reconnect_max_backoff: FEED_RECONNECT_MAX_BACKOFF,
        }
    }

    pub fn destination(&self) -> String {
        format!("/topic/{}", self.topic)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("topic", &self.topic)
            .field("subscription_id", &self.subscription_id)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_base_backoff", &self.reconnect_base_backoff)
            .field("reconnect_max_backoff", &self.reconnect_max_backoff)
            .finish()
    }
}

/// Delay before reconnect attempt number `consecutive_failures`, doubling from `base`
/// and capped at `max`.
pub fn reconnect_backoff(consecutive_failures: u32, base: Duration, max: Duration) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent).min(max)
}

pub struct FeedConnection<L: FeedListener> {
    config: FeedConfig,
    listener: L,
    cancel_token: CancellationToken,
    consecutive_failures: u32,
}

impl<L: FeedListener> FeedConnection<L> {
    pub fn new(config: FeedConfig, listener: L, cancel_token: CancellationToken) -> Self {
        FeedConnection {
            config,
            listener,
            cancel_token,
            consecutive_failures: 0,
        }
    }

    /// Relays notifications until cancelled, then hands the listener back.
    pub async fn spin(mut self) -> L {
        while !self.cancel_token.is_cancelled() {
            let Err(e) = self.run_session().await else {
                break;
            };

            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            let backoff = reconnect_backoff(
                self.consecutive_failures,
                self.config.reconnect_base_backoff,
                self.config.reconnect_max_backoff,
            );
            error!(
                "Feed connection to {} failed: {}. Reconnecting in {:?} (attempt {})",
                self.config.address(),
                e,
                backoff,
                self.consecutive_failures
            );

            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = sleep(backoff) => {}
            }
        }

        info!("Feed connection stopped");
        self.listener
    }

    /// Runs one connection from TCP connect to disconnect.
    ///
    /// Returns `Ok` only when the session ended because of cancellation.
    async fn run_session(&mut self) -> Result<(), StompError> {
        let cancel_token = self.cancel_token.clone();

        let mut stream = tokio::select! {
            _ = cancel_token.cancelled() => return Ok(()),
            stream = self.open() => stream?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => None,
                next = stream.next() => Some(next),
            };

            match next {
                None => {
                    disconnect(&mut stream).await;
                    return Ok(());
                }
                Some(Some(Ok(frame))) => self.dispatch(frame).await,
                Some(Some(Err(e))) => return Err(e),
                Some(None) => return Err(StompError::ConnectionClosed),
            }
        }
    }

    async fn open(&mut self) -> Result<FeedStream, StompError> {
        let address = self.config.address();
        let connect_timeout = self.config.connect_timeout;

        let socket = timeout(connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| StompError::Timeout("TCP connection"))??;
        let mut stream = Framed::new(socket, StompCodec::default());

        stream
            .send(
                Frame::new(Command::Connect)
                    .with_header("accept-version", "1.2")
                    .with_header("host", self.config.host.as_str())
                    .with_header("login", self.config.username.as_str())
                    .with_header("passcode", self.config.password.as_str())
                    .with_header("heart-beat", "0,0"),
            )
            .await?;

        let reply = timeout(connect_timeout, stream.next())
            .await
            .map_err(|_| StompError::Timeout("CONNECTED frame"))?
            .ok_or(StompError::ConnectionClosed)??;
        match reply.command {
            Command::Connected => {}
            Command::Error => return Err(StompError::Rejected(describe_error(&reply))),
            other => return Err(StompError::UnexpectedFrame(other.to_string())),
        }
        self.consecutive_failures = 0;
        info!(
            "Connected to feed at {} (server {})",
            address,
            reply.header("server").unwrap_or("unknown")
        );

        let destination = self.config.destination();
        stream
            .send(
                Frame::new(Command::Subscribe)
                    .with_header("destination", destination.as_str())
                    .with_header("id", self.config.subscription_id.as_str())
                    .with_header("ack", "auto"),
            )
            .await?;
        info!("Subscribed to {}", destination);

        Ok(stream)
    }

    async fn dispatch(&mut self, frame: Frame) {
        match frame.command {
            Command::Message => {
                self.listener
                    .on_message(&frame.headers_map(), &frame.body)
                    .await
            }
            Command::Error => self.listener.on_error(&frame.headers_map(), &frame.body).await,
            other => debug!("Ignoring {} frame from feed", other),
        }
    }
}

/// Sends DISCONNECT and waits, bounded, for its receipt.
async fn disconnect(stream: &mut FeedStream) {
    let frame = Frame::new(Command::Disconnect).with_header("receipt", FEED_DISCONNECT_RECEIPT_ID);
    if let Err(e) = stream.send(frame).await {
        warn!("Failed to send DISCONNECT to feed: {}", e);
        return;
    }

    let receipt = timeout(FEED_DISCONNECT_TIMEOUT, async {
        while let Some(Ok(frame)) = stream.next().await {
            if frame.command == Command::Receipt
                && frame.header("receipt-id") == Some(FEED_DISCONNECT_RECEIPT_ID)
            {
                return true;
            }
            debug!("Discarding {} frame received while disconnecting", frame.command);
        }
        false
    })
    .await;

    match receipt {
        Ok(true) => info!("Disconnected from feed"),
        _ => warn!("Feed did not acknowledge DISCONNECT, closing connection"),
    }
}

fn describe_error(frame: &Frame) -> String {
    let message = frame.header("message").unwrap_or("no message");
    if frame.body.is_empty() {
        message.to_string()
    } else {
        format!("{}: {}", message, String::from_utf8_lossy(&frame.body))
    }
}
