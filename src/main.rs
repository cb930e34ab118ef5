// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use pingpong_bot::config::BotConfig;
use pingpong_bot::gateway::EthGateway;
use pingpong_bot::logging;
use pingpong_bot::metrics::BotMetrics;
use pingpong_bot::planner::PlannerConfig;
use pingpong_bot::runner::Runner;
use pingpong_bot::store::ExchangeStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(rename_all = "kebab-case")]
struct Args {
    /// Overrides DATA_PATH from the environment.
    #[clap(long)]
    data_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = BotConfig::from_env()?;
    if let Some(data_path) = args.data_path {
        config.data_path = data_path;
    }

    let _log_guards = logging::init(&config.data_path)?;
    info!(?config, "starting");

    let registry = prometheus::Registry::new();
    let metrics = Arc::new(BotMetrics::new(&registry));

    let store = Arc::new(ExchangeStore::open(&config.data_path.join("db"))?);
    let gateway = Arc::new(EthGateway::new(&config, metrics.clone()).await?);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let runner = Runner::new(
        gateway,
        store.clone(),
        PlannerConfig {
            starting_block: config.starting_block,
            confirmation_blocks: config.confirmation_blocks,
            max_blocks_batch_size: config.max_blocks_batch_size,
        },
        config.stale_pong_timeout(),
        config.cooldown_period(),
        cancel,
        metrics,
    );

    let outcome = runner.run().await;

    // Gateway first (in-flight calls have drained with the loop), store last
    store.close()?;
    outcome?;
    info!("shutdown complete");
    Ok(())
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received"),
            _ = sigint.recv() => info!("SIGINT received"),
            _ = sighup.recv() => info!("SIGHUP received"),
        }
        cancel.cancel();
    });
}
