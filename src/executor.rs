// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Iteration executor: runs the phases of one planned pass in their fixed
//! order. Pongs are observed before pings so completions land before the same
//! range's pings are re-examined; pong submission and persistence alternate
//! one exchange at a time so a crash leaves at most one unstored submission.

use crate::error::{BotError, BotResult};
use crate::gateway::ChainGateway;
use crate::metrics::BotMetrics;
use crate::reconciler;
use crate::store::ExchangeStore;
use crate::types::{Exchange, Iteration};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct IterationExecutor<G> {
    gateway: Arc<G>,
    store: Arc<ExchangeStore>,
    stale_pong_timeout: Duration,
    metrics: Arc<BotMetrics>,
}

impl<G: ChainGateway> IterationExecutor<G> {
    pub fn new(
        gateway: Arc<G>,
        store: Arc<ExchangeStore>,
        stale_pong_timeout: Duration,
        metrics: Arc<BotMetrics>,
    ) -> Self {
        Self {
            gateway,
            store,
            stale_pong_timeout,
            metrics,
        }
    }

    pub async fn execute(&self, iteration: &Iteration) -> BotResult<()> {
        match iteration {
            Iteration::RecoveryStart { .. } => self.process_mempool().await,
            Iteration::Normal {
                from_block,
                to_block,
                ..
            } => {
                self.process_pongs(*from_block, *to_block, false).await?;
                self.process_pings(*from_block, *to_block).await?;
                self.cleanup()?;
                self.answer_pending_pings().await?;
                reconciler::process_stale_pongs(
                    self.gateway.as_ref(),
                    &self.store,
                    self.stale_pong_timeout,
                    &self.metrics,
                )
                .await
            }
            Iteration::Recovery {
                from_block,
                to_block,
                ..
            } => {
                // Storage is not authoritative yet: no pong issuance and no
                // stale reconciliation until the recovery window closes.
                self.process_pongs(*from_block, *to_block, true).await?;
                self.process_pings(*from_block, *to_block).await?;
                self.cleanup()
            }
            Iteration::RecoveryEnd { .. } => self.answer_pending_pings().await,
        }
    }

    /// Completes exchanges whose pong mined inside the range.
    ///
    /// Normal mode only trusts a pong the store already knows it issued; any
    /// other observation belongs to a sibling bot on the same contract or is
    /// a stale duplicate. Recovery mode cannot trust the store, so sender
    /// identity decides instead.
    async fn process_pongs(&self, from_block: u64, to_block: u64, recovery: bool) -> BotResult<()> {
        let pongs = self.gateway.get_pongs(from_block, to_block).await?;
        debug!(from_block, to_block, count = pongs.len(), recovery, "processing pongs");

        for pong in pongs {
            if recovery {
                let tx = self
                    .gateway
                    .get_transaction(pong.tx_hash)
                    .await?
                    .ok_or_else(|| {
                        BotError::Semantic(format!(
                            "pong transaction {:?} not retrievable during recovery",
                            pong.tx_hash
                        ))
                    })?;
                if tx.from != self.gateway.wallet_address() {
                    debug!(pong = ?pong.tx_hash, sender = ?tx.from, "pong from another wallet");
                    continue;
                }

                // Upsert, preserving whatever the store already learned
                let (ping_block, pong_timestamp) = match self.store.get_exchange(&pong.ping_hash)? {
                    Some(Exchange::Detected { ping_block, .. }) => (Some(ping_block), None),
                    Some(Exchange::PongIssued {
                        ping_block,
                        pong_timestamp,
                        ..
                    }) => (Some(ping_block), Some(pong_timestamp)),
                    Some(Exchange::Completed {
                        ping_block,
                        pong_timestamp,
                        ..
                    }) => (ping_block, pong_timestamp),
                    None => (None, None),
                };
                self.store.put_completed_exchange(
                    pong.ping_hash,
                    ping_block,
                    pong.tx_hash,
                    pong.block_number,
                    tx.nonce.as_u64(),
                    pong_timestamp,
                )?;
                self.metrics.pongs_completed_total.inc();
            } else {
                match self.store.get_exchange(&pong.ping_hash)? {
                    Some(Exchange::PongIssued {
                        ping_block,
                        pong_hash,
                        pong_nonce,
                        pong_timestamp,
                        ..
                    }) if pong_hash == pong.tx_hash => {
                        info!(
                            ping = ?pong.ping_hash,
                            pong = ?pong.tx_hash,
                            block = pong.block_number,
                            "exchange completed"
                        );
                        self.store.put_completed_exchange(
                            pong.ping_hash,
                            Some(ping_block),
                            pong_hash,
                            pong.block_number,
                            pong_nonce,
                            Some(pong_timestamp),
                        )?;
                        self.metrics.pongs_completed_total.inc();
                    }
                    other => {
                        debug!(
                            ping = ?pong.ping_hash,
                            pong = ?pong.tx_hash,
                            stored = other.as_ref().map(|e| e.state_name()),
                            "ignoring pong that does not match a pong we issued"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Indexes new pings in the range; already-known pings are untouched.
    async fn process_pings(&self, from_block: u64, to_block: u64) -> BotResult<()> {
        let pings = self.gateway.get_pings(from_block, to_block).await?;
        debug!(from_block, to_block, count = pings.len(), "processing pings");

        for ping in pings {
            if self.store.get_exchange(&ping.tx_hash)?.is_some() {
                debug!(ping = ?ping.tx_hash, "ping already indexed");
                continue;
            }
            info!(ping = ?ping.tx_hash, block = ping.block_number, "ping detected");
            self.store
                .put_ping_detected(ping.tx_hash, ping.block_number)?;
        }
        Ok(())
    }

    /// Drops completed exchanges. Bounded: a pong only completes once its
    /// block fell behind the confirmation cutoff, so replays within the
    /// window cannot resurrect it.
    fn cleanup(&self) -> BotResult<()> {
        let removed = self.store.remove_completed_exchanges()?;
        if !removed.is_empty() {
            info!(count = removed.len(), "completed exchanges removed");
        }
        Ok(())
    }

    /// Issues one pong per detected exchange with consecutive nonces from a
    /// single wallet snapshot. Submission and persistence strictly alternate.
    async fn answer_pending_pings(&self) -> BotResult<()> {
        let pending = self.store.get_ping_detected_exchanges()?;
        if pending.is_empty() {
            debug!("no pending pings");
            return Ok(());
        }

        self.gateway.refresh_fee_data().await?;
        let mut nonce = self.gateway.wallet_nonce().await?;
        info!(count = pending.len(), nonce, "answering pending pings");

        for exchange in pending {
            let Exchange::Detected {
                ping_hash,
                ping_block,
            } = exchange
            else {
                continue;
            };
            let receipt = self.gateway.pong(ping_hash, Some(nonce)).await?;
            self.store.put_pong_issued(
                ping_hash,
                ping_block,
                receipt.pong_hash,
                receipt.nonce,
                None,
            )?;
            nonce += 1;
        }
        Ok(())
    }

    /// Recovery mempool sweep: re-adopts pongs that were in flight when the
    /// previous process died, before any new issuance can double-answer them.
    async fn process_mempool(&self) -> BotResult<()> {
        let pongs = self.gateway.scan_my_mempool_pongs().await?;
        if pongs.is_empty() {
            debug!("no in-flight pongs in any mempool");
            return Ok(());
        }
        for pong in &pongs {
            info!(
                ping = ?pong.ping_hash,
                pong = ?pong.pong_hash,
                nonce = pong.pong_nonce,
                "re-adopted in-flight pong"
            );
            self.store.put_pong_issued(
                pong.ping_hash,
                pong.ping_block,
                pong.pong_hash,
                pong.pong_nonce,
                None,
            )?;
        }
        Ok(())
    }
}
