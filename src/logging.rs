// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Log sinks: two append-only files under the data path (`warn.log` at WARN
//! and above, `debug.log` at DEBUG and above) plus a pretty stream on stderr
//! filtered by `RUST_LOG` (default `info`).

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. The returned guards keep the non-blocking
/// file writers alive; drop them only at process exit.
pub fn init(data_path: &Path) -> anyhow::Result<Vec<WorkerGuard>> {
    std::fs::create_dir_all(data_path)?;

    let warn_file = tracing_appender::rolling::never(data_path, "warn.log");
    let (warn_writer, warn_guard) = tracing_appender::non_blocking(warn_file);

    let debug_file = tracing_appender::rolling::never(data_path, "debug.log");
    let (debug_writer, debug_guard) = tracing_appender::non_blocking(debug_file);

    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(warn_writer)
                .with_filter(LevelFilter::WARN),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(debug_writer)
                .with_filter(LevelFilter::DEBUG),
        )
        .with(
            fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .init();

    Ok(vec![warn_guard, debug_guard])
}
