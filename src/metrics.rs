// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub struct BotMetrics {
    /// RPC calls by provider and JSON-RPC method
    pub eth_rpc_queries: IntCounterVec,
    pub eth_rpc_errors: IntCounterVec,
    /// Iterations by descriptor kind and outcome (completed/aborted/skipped)
    pub iterations_total: IntCounterVec,
    pub pongs_submitted_total: IntCounter,
    pub pongs_completed_total: IntCounter,
    pub pongs_reissued_total: IntCounter,
    pub fee_bumps_total: IntCounter,
    pub last_processed_block: IntGauge,
}

impl BotMetrics {
    pub fn new(registry: &Registry) -> Self {
        let eth_rpc_queries = IntCounterVec::new(
            Opts::new("pingpong_eth_rpc_queries_total", "RPC queries issued"),
            &["provider", "method"],
        )
        .expect("Failed to create eth_rpc_queries metric");

        let eth_rpc_errors = IntCounterVec::new(
            Opts::new("pingpong_eth_rpc_errors_total", "RPC queries that failed"),
            &["provider", "method"],
        )
        .expect("Failed to create eth_rpc_errors metric");

        let iterations_total = IntCounterVec::new(
            Opts::new("pingpong_iterations_total", "Iterations by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("Failed to create iterations_total metric");

        let pongs_submitted_total = IntCounter::new(
            "pingpong_pongs_submitted_total",
            "Pong transactions submitted",
        )
        .expect("Failed to create pongs_submitted_total metric");

        let pongs_completed_total = IntCounter::new(
            "pingpong_pongs_completed_total",
            "Exchanges promoted to completed",
        )
        .expect("Failed to create pongs_completed_total metric");

        let pongs_reissued_total = IntCounter::new(
            "pingpong_pongs_reissued_total",
            "Stale pongs resubmitted after dropping from every mempool",
        )
        .expect("Failed to create pongs_reissued_total metric");

        let fee_bumps_total = IntCounter::new(
            "pingpong_fee_bumps_total",
            "Pending pongs replaced with higher fees",
        )
        .expect("Failed to create fee_bumps_total metric");

        let last_processed_block = IntGauge::new(
            "pingpong_last_processed_block",
            "toBlock of the last completed iteration",
        )
        .expect("Failed to create last_processed_block metric");

        registry.register(Box::new(eth_rpc_queries.clone())).ok();
        registry.register(Box::new(eth_rpc_errors.clone())).ok();
        registry.register(Box::new(iterations_total.clone())).ok();
        registry
            .register(Box::new(pongs_submitted_total.clone()))
            .ok();
        registry
            .register(Box::new(pongs_completed_total.clone()))
            .ok();
        registry
            .register(Box::new(pongs_reissued_total.clone()))
            .ok();
        registry.register(Box::new(fee_bumps_total.clone())).ok();
        registry
            .register(Box::new(last_processed_block.clone()))
            .ok();

        Self {
            eth_rpc_queries,
            eth_rpc_errors,
            iterations_total,
            pongs_submitted_total,
            pongs_completed_total,
            pongs_reissued_total,
            fee_bumps_total,
            last_processed_block,
        }
    }

    #[cfg(test)]
    pub fn for_testing() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new(&Registry::new()))
    }
}
