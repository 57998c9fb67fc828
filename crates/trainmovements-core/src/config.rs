// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ListenerError;
use std::env;
use std::fmt;
use std::path::PathBuf;
use trainmovements_relay::constants::{
    DEFAULT_AWS_REGION, DEFAULT_FEED_HOST, DEFAULT_FEED_PORT, DEFAULT_FEED_TOPIC, DEFAULT_LOG_DIR,
};
use trainmovements_relay::feed::FeedConfig;
use trainmovements_relay::sigv4::AwsCredentials;
use trainmovements_relay::sqs::SqsConfig;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the relay: feed login, destination queue and logging.
#[derive(Clone)]
pub struct RelayConfig {
    /// Network Rail data feeds login
    pub feed_username: String,
    pub feed_password: String,
    pub feed_host: String,
    pub feed_port: u16,
    /// Topic name without the `/topic/` prefix
    pub feed_topic: String,
    /// URL of the destination SQS queue
    pub queue_url: String,
    pub aws_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_session_token: Option<String>,
    /// Overrides the endpoint derived from the queue URL
    pub sqs_endpoint: Option<String>,
    /// HTTPS proxy URL for queue requests
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory holding `debug.log` and `warning.log`
    pub log_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            feed_username: String::new(),
            feed_password: String::new(),
            feed_host: DEFAULT_FEED_HOST.to_string(),
            feed_port: DEFAULT_FEED_PORT,
            feed_topic: DEFAULT_FEED_TOPIC.to_string(),
            queue_url: String::new(),
            aws_region: DEFAULT_AWS_REGION.to_string(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            aws_session_token: None,
            sqs_endpoint: None,
            https_proxy: None,
            log_level: "info".to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("feed_username", &self.feed_username)
            .field("feed_password", &"<redacted>")
            .field("feed_host", &self.feed_host)
            .field("feed_port", &self.feed_port)
            .field("feed_topic", &self.feed_topic)
            .field("queue_url", &self.queue_url)
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"<redacted>")
            .field(
                "aws_session_token",
                &self.aws_session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("sqs_endpoint", &self.sqs_endpoint)
            .field("https_proxy", &self.https_proxy)
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl RelayConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ListenerError> {
        let defaults = Self::default();

        let feed_port = match non_empty_var("NR_DATAFEEDS_PORT") {
            Some(port) => port.parse::<u16>().map_err(|_| {
                ListenerError::InvalidConfig(format!("NR_DATAFEEDS_PORT '{port}' is not a valid port"))
            })?,
            None => defaults.feed_port,
        };

        let config = Self {
            feed_username: env::var("NR_DATAFEEDS_USERNAME").unwrap_or_default(),
            feed_password: env::var("NR_DATAFEEDS_PASSWORD").unwrap_or_default(),
            feed_host: non_empty_var("NR_DATAFEEDS_HOST").unwrap_or(defaults.feed_host),
            feed_port,
            feed_topic: non_empty_var("NR_DATAFEEDS_TOPIC").unwrap_or(defaults.feed_topic),
            queue_url: env::var("AWS_SQS_QUEUE_URL").unwrap_or_default(),
            aws_region: non_empty_var("AWS_REGION")
                .or_else(|| non_empty_var("AWS_DEFAULT_REGION"))
                .unwrap_or(defaults.aws_region),
            aws_access_key_id: env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            aws_secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            aws_session_token: non_empty_var("AWS_SESSION_TOKEN"),
            sqs_endpoint: non_empty_var("AWS_SQS_ENDPOINT"),
            https_proxy: non_empty_var("HTTPS_PROXY"),
            log_level: non_empty_var("RELAY_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
            log_dir: log_dir_from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ListenerError> {
        let required = [
            ("NR_DATAFEEDS_USERNAME", &self.feed_username),
            ("NR_DATAFEEDS_PASSWORD", &self.feed_password),
            ("AWS_SQS_QUEUE_URL", &self.queue_url),
            ("AWS_ACCESS_KEY_ID", &self.aws_access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &self.aws_secret_access_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ListenerError::InvalidConfig(format!("{name} must be set")));
            }
        }

        if self.feed_host.trim().is_empty() {
            return Err(ListenerError::InvalidConfig(
                "NR_DATAFEEDS_HOST cannot be empty".to_string(),
            ));
        }

        if self.feed_port == 0 {
            return Err(ListenerError::InvalidConfig(
                "Feed port must be greater than 0".to_string(),
            ));
        }

        if self.feed_topic.trim().is_empty() {
            return Err(ListenerError::InvalidConfig(
                "NR_DATAFEEDS_TOPIC cannot be empty".to_string(),
            ));
        }

        if !is_http_url(&self.queue_url) {
            return Err(ListenerError::InvalidConfig(format!(
                "AWS_SQS_QUEUE_URL '{}' must be an absolute http(s) URL",
                self.queue_url
            )));
        }

        if let Some(endpoint) = &self.sqs_endpoint {
            if !is_http_url(endpoint) {
                return Err(ListenerError::InvalidConfig(format!(
                    "AWS_SQS_ENDPOINT '{endpoint}' must be an absolute http(s) URL"
                )));
            }
        }

        if self.aws_region.trim().is_empty() {
            return Err(ListenerError::InvalidConfig(
                "AWS_REGION cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ListenerError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig::new(
            self.feed_host.as_str(),
            self.feed_port,
            self.feed_username.as_str(),
            self.feed_password.as_str(),
            self.feed_topic.as_str(),
        )
    }

    pub fn sqs_config(&self) -> SqsConfig {
        let mut config = SqsConfig::new(
            self.queue_url.as_str(),
            AwsCredentials {
                access_key_id: self.aws_access_key_id.clone(),
                secret_access_key: self.aws_secret_access_key.clone(),
                session_token: self.aws_session_token.clone(),
            },
        );
        config.region = self.aws_region.clone();
        config.endpoint = self.sqs_endpoint.clone();
        config.https_proxy = self.https_proxy.clone();
        config
    }
}

/// Log directory from `RELAY_LOG_DIR`. Logging starts before the rest of the
/// configuration is loaded, so this is read on its own.
pub fn log_dir_from_env() -> PathBuf {
    non_empty_var("RELAY_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

fn is_http_url(url: &str) -> bool {
    ["https://", "http://"].iter().any(|scheme| {
        url.strip_prefix(scheme)
            .and_then(|rest| rest.split('/').next())
            .is_some_and(|host| !host.is_empty())
    })
}
