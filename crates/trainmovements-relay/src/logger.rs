// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatter for the relay.
//!
//! ```text
//! [2016-02-11 09:30:01,042] INFO: Sent 1000 messages, ~0.712 MB
//! [2016-02-11 09:30:05,311] ERROR: feed_session{attempt=3}: Feed connection failed
//! ```
//!
//! Besides stdout, lines go to two size-rotated files: `debug.log` with every event at
//! DEBUG and above, and `warning.log` with WARN and above.
//!
//! ```rust,ignore
//! let (files, _guard) = logger::file_layers(Path::new("/var/log/train-movements-listener"))?;
//! let subscriber = tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer().event_format(Formatter).with_filter(env_filter))
//!     .with(files);
//! tracing::subscriber::set_global_default(subscriber)?;
//! ```

use crate::constants::{
    DEBUG_LOG_FILE_NAME, DEBUG_LOG_MAX_BYTES, LOG_FILE_BACKUPS, WARNING_LOG_FILE_NAME,
    WARNING_LOG_MAX_BYTES,
};
use chrono::Local;
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use std::path::Path;
use std::{fmt, fs, io};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// HTTP client internals, kept out of the logs.
const QUIET_TARGETS: [&str; 4] = ["h2", "hyper", "reqwest", "rustls"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Renders `[timestamp] LEVEL: [span{fields}: ]message fields`, in local time.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            &mut writer,
            "[{}] {}: ",
            Local::now().format(TIMESTAMP_FORMAT),
            event.metadata().level()
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Keeps the log file writers running. Dropping it flushes what is still queued.
#[must_use]
pub struct FileLogGuard {
    _debug: WorkerGuard,
    _warning: WorkerGuard,
}

/// Layers writing `debug.log` and `warning.log` under `dir`, creating it if needed.
pub fn file_layers<S>(
    dir: &Path,
) -> io::Result<(impl Layer<S> + Send + Sync + 'static, FileLogGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(dir)?;
    let (debug_writer, debug_guard) =
        rolling_writer(dir, DEBUG_LOG_FILE_NAME, DEBUG_LOG_MAX_BYTES)?;
    let (warning_writer, warning_guard) =
        rolling_writer(dir, WARNING_LOG_FILE_NAME, WARNING_LOG_MAX_BYTES)?;

    let debug_layer = tracing_subscriber::fmt::layer()
        .event_format(Formatter)
        .with_writer(debug_writer)
        .with_filter(quiet_targets(LevelFilter::DEBUG));
    let warning_layer = tracing_subscriber::fmt::layer()
        .event_format(Formatter)
        .with_writer(warning_writer)
        .with_filter(LevelFilter::WARN);

    Ok((
        debug_layer.and_then(warning_layer),
        FileLogGuard {
            _debug: debug_guard,
            _warning: warning_guard,
        },
    ))
}

/// `level` for everything except the HTTP client internals.
fn quiet_targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_targets(QUIET_TARGETS.map(|target| (target, LevelFilter::OFF)))
}

fn rolling_writer(
    dir: &Path,
    file_name: &str,
    max_bytes: u64,
) -> io::Result<(NonBlocking, WorkerGuard)> {
    let appender = BasicRollingFileAppender::new(
        dir.join(file_name),
        RollingConditionBasic::new().max_size(max_bytes),
        LOG_FILE_BACKUPS,
    )?;
    Ok(tracing_appender::non_blocking(appender))
}
