// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process STOMP broker and SQS responders for integration tests

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use trainmovements_relay::stomp::{Command, Frame, StompCodec};

const WAIT: Duration = Duration::from_secs(5);

pub struct FakeBroker {
    listener: TcpListener,
}

impl FakeBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind broker");
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().expect("bound address").port()
    }

    pub async fn accept(&self) -> BrokerSession {
        let (socket, _) = timeout(WAIT, self.listener.accept())
            .await
            .expect("no client connected")
            .expect("accept failed");
        BrokerSession {
            stream: Framed::new(socket, StompCodec::default()),
            next_message_id: 0,
        }
    }
}

pub struct BrokerSession {
    stream: Framed<TcpStream, StompCodec>,
    next_message_id: u32,
}

impl BrokerSession {
    pub async fn expect(&mut self, command: Command) -> Frame {
        let frame = timeout(WAIT, self.stream.next())
            .await
            .expect("no frame from client")
            .expect("client closed connection")
            .expect("invalid frame from client");
        assert_eq!(frame.command, command);
        frame
    }

    /// Accepts CONNECT and SUBSCRIBE, returning both frames.
    pub async fn handshake(&mut self) -> (Frame, Frame) {
        let connect = self.expect(Command::Connect).await;
        self.stream
            .send(
                Frame::new(Command::Connected)
                    .with_header("version", "1.2")
                    .with_header("server", "fake-broker"),
            )
            .await
            .expect("failed to send CONNECTED");
        let subscribe = self.expect(Command::Subscribe).await;
        (connect, subscribe)
    }

    pub async fn send_message(&mut self, body: &[u8]) {
        self.next_message_id += 1;
        let frame = Frame::new(Command::Message)
            .with_header("destination", "/topic/TRAIN_MVT_ALL_TOC")
            .with_header("subscription", "1")
            .with_header("message-id", format!("ID:fake-broker-{}", self.next_message_id))
            .with_body(body.to_vec());
        self.stream.send(frame).await.expect("failed to send MESSAGE");
    }

    /// Waits for DISCONNECT and answers its receipt request.
    pub async fn acknowledge_disconnect(&mut self) -> Frame {
        let disconnect = self.expect(Command::Disconnect).await;
        let receipt = disconnect.header("receipt").unwrap_or_default().to_string();
        self.stream
            .send(Frame::new(Command::Receipt).with_header("receipt-id", receipt))
            .await
            .expect("failed to send RECEIPT");
        disconnect
    }
}

/// Envelope body holding `count` train movement records.
pub fn envelope(first: usize, count: usize) -> Vec<u8> {
    let records: Vec<serde_json::Value> = (first..first + count)
        .map(|n| {
            serde_json::json!({
                "header": {"msg_type": "0003", "source_dev_id": "", "msg_queue_timestamp": n.to_string()},
                "body": {"train_id": format!("{n:010}"), "event_type": "ARRIVAL"}
            })
        })
        .collect();
    serde_json::to_vec(&records).expect("serializable envelope")
}

/// SendMessageBatch response reporting every entry of `request_body` as sent.
pub fn all_successful_response(request_body: &[u8]) -> Vec<u8> {
    let request: serde_json::Value =
        serde_json::from_slice(request_body).expect("request body is JSON");
    let successful: Vec<serde_json::Value> = request["Entries"]
        .as_array()
        .expect("Entries array")
        .iter()
        .map(|entry| {
            serde_json::json!({
                "Id": entry["Id"],
                "MessageId": format!("msg-{}", entry["Id"].as_str().unwrap_or_default()),
                "MD5OfMessageBody": "d41d8cd98f00b204e9800998ecf8427e"
            })
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({ "Successful": successful, "Failed": [] }))
        .expect("serializable response")
}
