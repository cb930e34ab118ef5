// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The run loop: plan, persist, execute, complete, sleep. One logical worker;
//! the next tick never starts before the previous one finished or aborted.

use crate::error::{BotError, BotResult};
use crate::executor::IterationExecutor;
use crate::gateway::ChainGateway;
use crate::metrics::BotMetrics;
use crate::planner::{plan, PlannerConfig};
use crate::retry_with_max_elapsed_time;
use crate::store::ExchangeStore;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const HEIGHT_FETCH_BUDGET: Duration = Duration::from_secs(90);

pub struct Runner<G> {
    gateway: Arc<G>,
    store: Arc<ExchangeStore>,
    executor: IterationExecutor<G>,
    planner_config: PlannerConfig,
    cooldown: Duration,
    cancel: CancellationToken,
    metrics: Arc<BotMetrics>,
}

impl<G: ChainGateway> Runner<G> {
    pub fn new(
        gateway: Arc<G>,
        store: Arc<ExchangeStore>,
        planner_config: PlannerConfig,
        stale_pong_timeout: Duration,
        cooldown: Duration,
        cancel: CancellationToken,
        metrics: Arc<BotMetrics>,
    ) -> Self {
        let executor = IterationExecutor::new(
            gateway.clone(),
            store.clone(),
            stale_pong_timeout,
            metrics.clone(),
        );
        Self {
            gateway,
            store,
            executor,
            planner_config,
            cooldown,
            cancel,
            metrics,
        }
    }

    /// Repeats iterate-then-sleep until cancelled. Iteration aborts are
    /// logged and healed by the next tick's recovery; storage faults
    /// terminate the loop with the error.
    pub async fn run(&self) -> BotResult<()> {
        info!(cooldown = ?self.cooldown, "run loop started");
        loop {
            match self.iterate().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "fatal fault, stopping");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        error_type = e.error_type(),
                        "iteration aborted; next tick enters recovery"
                    );
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }
        info!("run loop stopped");
        Ok(())
    }

    /// One tick: plan from the stored descriptor and the live head, persist
    /// the plan before any side effect, execute, then mark it completed.
    pub async fn iterate(&self) -> BotResult<()> {
        let previous = self.store.get_iteration()?;

        let head = match retry_with_max_elapsed_time!(
            self.gateway.current_block_height(),
            HEIGHT_FETCH_BUDGET
        ) {
            Ok(Ok(height)) => height,
            _ => {
                return Err(BotError::TransientProvider(
                    "chain height unavailable after retries".to_string(),
                ))
            }
        };

        let Some(iteration) = plan(previous.as_ref(), head, &self.planner_config) else {
            debug!(head, "nothing confirmed to scan, skipping tick");
            self.metrics
                .iterations_total
                .with_label_values(&["skip", "skipped"])
                .inc();
            return Ok(());
        };

        info!(
            kind = iteration.kind(),
            from = ?iteration.from_block(),
            to = iteration.to_block(),
            head,
            "iteration planned"
        );
        self.store.set_iteration(&iteration)?;

        if let Err(e) = self.executor.execute(&iteration).await {
            self.metrics
                .iterations_total
                .with_label_values(&[iteration.kind(), "aborted"])
                .inc();
            return Err(e);
        }

        self.store.set_iteration(&iteration.completed())?;
        self.metrics
            .iterations_total
            .with_label_values(&[iteration.kind(), "completed"])
            .inc();
        self.metrics
            .last_processed_block
            .set(iteration.to_block() as i64);
        Ok(())
    }
}
