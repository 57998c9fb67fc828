// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! SQS implementation of [`QueueSender`] over the JSON protocol.

use crate::constants::{DEFAULT_AWS_REGION, QUEUE_REQUEST_TIMEOUT, SQS_MAX_BATCH_ENTRIES};
use crate::errors::QueueError;
use crate::queue::{QueueSender, SendBatchOutcome};
use crate::record::OutboundItem;
use crate::sigv4::{sign_request, AwsCredentials, SignableRequest};
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "sqs";
const TARGET_SEND_MESSAGE_BATCH: &str = "AmazonSQS.SendMessageBatch";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

#[derive(Debug, Clone)]
pub struct SqsConfig {
    pub queue_url: String,
    pub region: String,
    /// Endpoint override; the queue URL's origin is used when unset.
    pub endpoint: Option<String>,
    pub credentials: AwsCredentials,
    pub https_proxy: Option<String>,
    pub timeout: Duration,
}

impl SqsConfig {
    pub fn new(queue_url: impl Into<String>, credentials: AwsCredentials) -> Self {
        SqsConfig {
            queue_url: queue_url.into(),
            region: DEFAULT_AWS_REGION.to_string(),
            endpoint: None,
            credentials,
            https_proxy: None,
            timeout: QUEUE_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: &'a [OutboundItem],
}

pub struct SqsQueueSender {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    queue_url: String,
    region: String,
    credentials: AwsCredentials,
}

impl SqsQueueSender {
    pub fn new(config: SqsConfig) -> Result<Self, QueueError> {
        let endpoint = config.endpoint.as_deref().unwrap_or(&config.queue_url);
        let (endpoint, host) = parse_endpoint(endpoint)?;
        let client = build_client(config.https_proxy.as_deref(), config.timeout)?;

        Ok(SqsQueueSender {
            client,
            endpoint,
            host,
            queue_url: config.queue_url,
            region: config.region,
            credentials: config.credentials,
        })
    }
}

#[async_trait]
impl QueueSender for SqsQueueSender {
    async fn send_batch(&self, entries: &[OutboundItem]) -> Result<SendBatchOutcome, QueueError> {
        if entries.len() > SQS_MAX_BATCH_ENTRIES {
            return Err(QueueError::TooManyEntries {
                count: entries.len(),
                max: SQS_MAX_BATCH_ENTRIES,
            });
        }

        let body = serde_json::to_vec(&SendMessageBatchRequest {
            queue_url: &self.queue_url,
            entries,
        })
        .map_err(QueueError::Payload)?;

        let signed = sign_request(
            &SignableRequest {
                method: "POST",
                host: &self.host,
                path: self.endpoint.path(),
                headers: &[
                    ("content-type", CONTENT_TYPE),
                    ("x-amz-target", TARGET_SEND_MESSAGE_BATCH),
                ],
                body: &body,
            },
            &self.credentials,
            &self.region,
            SERVICE,
            chrono::Utc::now(),
        )?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", TARGET_SEND_MESSAGE_BATCH)
            .header("X-Amz-Date", signed.amz_date)
            .header("Authorization", signed.authorization);
        if let Some(token) = signed.security_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        debug!("Sending batch of {} entries to {}", entries.len(), self.queue_url);
        let response = request.body(body).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(QueueError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        serde_json::from_slice(&body).map_err(QueueError::Response)
    }
}

/// Reduces `endpoint` to its origin and returns it with the value of the Host header.
fn parse_endpoint(endpoint: &str) -> Result<(Url, String), QueueError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| QueueError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(QueueError::InvalidEndpoint(format!(
            "{endpoint}: scheme must be http or https"
        )));
    }
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(QueueError::InvalidEndpoint(format!("{endpoint}: missing host")))
        }
    };
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok((url, host))
}

/// Builds a reqwest client with optional proxy configuration and timeout.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn credentials(session_token: Option<&str>) -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: session_token.map(str::to_string),
        }
    }

    fn items(count: usize) -> Vec<OutboundItem> {
        (0..count)
            .map(|i| OutboundItem {
                id: format!("id-{i}"),
                message_body: format!("{{\"n\": {i}}}"),
            })
            .collect()
    }

    fn sender_for(server: &Server, session_token: Option<&str>) -> SqsQueueSender {
        let queue_url = format!("{}/123456789012/train-movements", server.url());
        SqsQueueSender::new(SqsConfig::new(queue_url, credentials(session_token))).unwrap()
    }

    #[tokio::test]
    async fn test_send_batch_posts_signed_request_and_parses_outcome() {
        let mut server = Server::new_async().await;
        let queue_url = format!("{}/123456789012/train-movements", server.url());

        let mock = server
            .mock("POST", "/")
            .match_header("x-amz-target", "AmazonSQS.SendMessageBatch")
            .match_header("content-type", "application/x-amz-json-1.0")
            .match_header("x-amz-date", Matcher::Regex(r"^\d{8}T\d{6}Z$".to_string()))
            .match_header(
                "authorization",
                Matcher::Regex(
                    r"^AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/\d{8}/eu-west-1/sqs/aws4_request, SignedHeaders=content-type;host;x-amz-date;x-amz-target, Signature=[0-9a-f]{64}$"
                        .to_string(),
                ),
            )
            .match_header("x-amz-security-token", Matcher::Missing)
            .match_body(Matcher::Json(json!({
                "QueueUrl": queue_url,
                "Entries": [
                    {"Id": "id-0", "MessageBody": "{\"n\": 0}"},
                    {"Id": "id-1", "MessageBody": "{\"n\": 1}"},
                ]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "Successful": [{"Id": "id-0", "MessageId": "m-0", "MD5OfMessageBody": "x"}],
                    "Failed": [{"Id": "id-1", "SenderFault": false, "Code": "throttled"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let sender = sender_for(&server, None);
        let outcome = sender.send_batch(&items(2)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(outcome.successful.len(), 1);
        assert_eq!(outcome.successful[0].message_id.as_deref(), Some("m-0"));
        assert_eq!(outcome.failed[0].id, "id-1");
        assert_eq!(outcome.failed[0].code.as_deref(), Some("throttled"));
    }

    #[tokio::test]
    async fn test_session_token_is_sent_and_signed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("x-amz-security-token", "session")
            .match_header(
                "authorization",
                Matcher::Regex("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target,".to_string()),
            )
            .with_status(200)
            .with_body(r#"{"Successful":[]}"#)
            .create_async()
            .await;

        let sender = sender_for(&server, Some("session"));
        sender.send_batch(&items(1)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_carries_response_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(403)
            .with_body(r#"{"__type":"com.amazon.coral.service#AccessDeniedException"}"#)
            .create_async()
            .await;

        let error = sender_for(&server, None)
            .send_batch(&items(1))
            .await
            .expect_err("403 is an error");

        match error {
            QueueError::Status { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("AccessDeniedException"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_response_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let error = sender_for(&server, None)
            .send_batch(&items(1))
            .await
            .expect_err("body is not JSON");
        assert!(matches!(error, QueueError::Response(_)));
    }

    #[tokio::test]
    async fn test_more_than_ten_entries_rejected_without_request() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/").expect(0).create_async().await;

        let error = sender_for(&server, None)
            .send_batch(&items(11))
            .await
            .expect_err("too many entries");

        assert!(matches!(
            error,
            QueueError::TooManyEntries { count: 11, max: 10 }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_endpoint_override_takes_precedence() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "QueueUrl": "https://sqs.eu-west-1.amazonaws.com/123456789012/train-movements"
            })))
            .with_status(200)
            .with_body(r#"{"Successful":[{"Id":"id-0"}]}"#)
            .create_async()
            .await;

        let mut config = SqsConfig::new(
            "https://sqs.eu-west-1.amazonaws.com/123456789012/train-movements",
            credentials(None),
        );
        config.endpoint = Some(server.url());
        let sender = SqsQueueSender::new(config).unwrap();

        let outcome = sender.send_batch(&items(1)).await.unwrap();
        mock.assert_async().await;
        assert_eq!(outcome.successful[0].id, "id-0");
    }

    #[test]
    fn test_parse_endpoint() {
        let (url, host) =
            parse_endpoint("https://sqs.eu-west-1.amazonaws.com/123456789012/q?x=1").unwrap();
        assert_eq!(url.as_str(), "https://sqs.eu-west-1.amazonaws.com/");
        assert_eq!(host, "sqs.eu-west-1.amazonaws.com");

        let (url, host) = parse_endpoint("http://localhost:9324/000000000000/q").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9324/");
        assert_eq!(host, "localhost:9324");

        assert!(matches!(
            parse_endpoint("not a url"),
            Err(QueueError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            parse_endpoint("ftp://example.com/q"),
            Err(QueueError::InvalidEndpoint(_))
        ));
    }
}
