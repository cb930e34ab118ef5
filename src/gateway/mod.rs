// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The chain gateway: the only surface through which the core touches RPC
//! providers. The executor and run loop are generic over this trait, so tests
//! drive them with a programmable mock instead of a network.

pub mod eth;
pub mod rate_limited_provider;

use crate::error::BotResult;
use async_trait::async_trait;
use ethers::types::{Address, Transaction, TxHash, U256};

pub use eth::EthGateway;

/// A finalized `Ping()` log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingLog {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// A finalized `Pong(pingHash)` log; the indexed argument names the ping it
/// answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PongLog {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub ping_hash: TxHash,
}

/// Cached EIP-1559 estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// A transaction found in some provider's mempool view, tagged with the
/// provider that saw it so a replacement can go back through the same one.
#[derive(Clone, Debug)]
pub struct MempoolTx {
    pub provider_name: String,
    pub tx: Transaction,
}

/// One of our own in-flight pongs discovered by the pending-block sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MempoolPong {
    pub ping_hash: TxHash,
    pub ping_block: u64,
    pub pong_hash: TxHash,
    pub pong_nonce: u64,
}

/// Outcome of a pong submission. Carries the nonce actually used so the
/// caller can persist it without a second RPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PongReceipt {
    pub pong_hash: TxHash,
    pub nonce: u64,
}

/// Every call may fail; failures abort the current iteration and the next
/// tick recovers.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn current_block_height(&self) -> BotResult<u64>;

    /// Finalized `Ping()` logs in the inclusive range.
    async fn get_pings(&self, from_block: u64, to_block: u64) -> BotResult<Vec<PingLog>>;

    /// Finalized `Pong(pingHash)` logs in the inclusive range.
    async fn get_pongs(&self, from_block: u64, to_block: u64) -> BotResult<Vec<PongLog>>;

    async fn get_transaction(&self, tx_hash: TxHash) -> BotResult<Option<Transaction>>;

    fn wallet_address(&self) -> Address;

    /// Next nonce the wallet will use, counting pending transactions.
    async fn wallet_nonce(&self) -> BotResult<u64>;

    /// Re-estimates fees and replaces the cache; returns the fresh estimate.
    async fn refresh_fee_data(&self) -> BotResult<FeeData>;

    async fn current_fee_data(&self) -> BotResult<FeeData>;

    /// Submits `pong(ping_hash)` with the cached fee data. When `nonce` is
    /// absent the wallet's pending nonce is fetched and used.
    async fn pong(&self, ping_hash: TxHash, nonce: Option<u64>) -> BotResult<PongReceipt>;

    /// Polls each configured provider's mempool view in priority order and
    /// trusts the first that returns a record.
    async fn search_mempool_transaction(&self, tx_hash: TxHash) -> BotResult<Option<MempoolTx>>;

    /// Replaces a pending transaction (same nonce, higher fees) via the
    /// provider that saw it.
    async fn bump_transaction_fees(
        &self,
        stale_tx: &Transaction,
        new_fees: FeeData,
        provider_name: &str,
    ) -> BotResult<()>;

    /// Sweeps every provider's pending block for our own pong calls,
    /// aggregated last-writer-wins on the ping hash.
    async fn scan_my_mempool_pongs(&self) -> BotResult<Vec<MempoolPong>>;
}
