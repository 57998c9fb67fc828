// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

use trainmovements_core::{log_dir_from_env, ListenerServices, RelayConfig};
use trainmovements_relay::logger::{self, Formatter};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("RELAY_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,reqwest=off,rustls=off,{}", log_level);
    let env_filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .event_format(Formatter)
        .with_writer(std::io::stdout)
        .with_filter(env_filter);

    let log_dir = log_dir_from_env();
    let (file_layers, _file_log_guard, file_log_error) =
        match logger::file_layers::<Registry>(&log_dir) {
            Ok((layers, guard)) => (Some(layers), Some(guard), None),
            Err(e) => (None, None, Some(e)),
        };

    let subscriber = tracing_subscriber::registry()
        .with(file_layers)
        .with(stdout_layer);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    match file_log_error {
        Some(e) => warn!(
            "Logging to stdout only, cannot write to {}: {}",
            log_dir.display(),
            e
        ),
        None => debug!("Writing log files to {}", log_dir.display()),
    }
    debug!("Logging subsystem enabled");

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("Loaded configuration {:?}", config);

    let mut services = ListenerServices::new(config);
    let handle = match services.start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start listener: {}", e);
            return ExitCode::FAILURE;
        }
    };

    wait_for_shutdown_signal().await;
    info!("Keyboard interrupt, quitting.");

    if let Err(e) = handle.stop().await {
        error!("Failed to stop listener: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = handle.wait_stopped(SHUTDOWN_TIMEOUT).await {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => error!("Unable to listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C: {}", e);
    }
}
