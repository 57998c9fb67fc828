// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration and lifecycle of the train movements listener.
//!
//! ```rust,ignore
//! let config = RelayConfig::from_env()?;
//! let mut services = ListenerServices::new(config);
//! let handle = services.start().await?;
//! // ...
//! handle.stop().await?;
//! handle.wait_stopped(Duration::from_secs(30)).await?;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod services;

pub use config::{log_dir_from_env, RelayConfig};
pub use error::ListenerError;
pub use services::{ListenerHandle, ListenerServices, ServiceStatus};
