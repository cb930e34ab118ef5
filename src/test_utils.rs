// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Programmable gateway for tests: every field is public and behind a plain
//! mutex so scenarios can seed chain state and inspect what the core did.

use crate::error::{BotError, BotResult};
use crate::gateway::{
    ChainGateway, FeeData, MempoolPong, MempoolTx, PingLog, PongLog, PongReceipt,
};
use async_trait::async_trait;
use ethers::types::{Address, Transaction, TxHash, U256, U64};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmittedPong {
    pub ping_hash: TxHash,
    pub nonce: u64,
    pub pong_hash: TxHash,
}

pub struct MockGateway {
    pub wallet: Address,
    pub height: Mutex<u64>,
    pub pings: Mutex<Vec<PingLog>>,
    pub pongs: Mutex<Vec<PongLog>>,
    pub transactions: Mutex<HashMap<TxHash, Transaction>>,
    /// pongHash -> (provider name, pending view of the transaction)
    pub mempool: Mutex<HashMap<TxHash, (String, Transaction)>>,
    pub mempool_pongs: Mutex<Vec<MempoolPong>>,
    pub next_nonce: Mutex<u64>,
    pub fee_data: Mutex<FeeData>,
    pub fee_refreshes: Mutex<u64>,
    pub submitted: Mutex<Vec<SubmittedPong>>,
    pub bumps: Mutex<Vec<(TxHash, FeeData, String)>>,
    /// When set, every RPC-shaped call fails; exercises the abort paths.
    pub fail_rpc: Mutex<bool>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            wallet: Address::repeat_byte(0xAA),
            height: Mutex::new(0),
            pings: Mutex::new(Vec::new()),
            pongs: Mutex::new(Vec::new()),
            transactions: Mutex::new(HashMap::new()),
            mempool: Mutex::new(HashMap::new()),
            mempool_pongs: Mutex::new(Vec::new()),
            next_nonce: Mutex::new(0),
            fee_data: Mutex::new(FeeData {
                max_fee_per_gas: U256::from(2_000_000_000u64),
                max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            }),
            fee_refreshes: Mutex::new(0),
            submitted: Mutex::new(Vec::new()),
            bumps: Mutex::new(Vec::new()),
            fail_rpc: Mutex::new(false),
        }
    }

    pub fn insert_transaction(
        &self,
        hash: TxHash,
        from: Address,
        nonce: u64,
        block_number: Option<u64>,
    ) {
        let tx = Transaction {
            hash,
            from,
            nonce: U256::from(nonce),
            block_number: block_number.map(U64::from),
            ..Default::default()
        };
        self.transactions.lock().unwrap().insert(hash, tx);
    }

    fn check_rpc(&self) -> BotResult<()> {
        if *self.fail_rpc.lock().unwrap() {
            return Err(BotError::TransientProvider("mock outage".to_string()));
        }
        Ok(())
    }

    fn fresh_pong_hash(&self) -> TxHash {
        let count = self.submitted.lock().unwrap().len() as u64;
        TxHash::from_low_u64_be(0xB000_0000 + count)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// A pending-view transaction with EIP-1559 fees, as a mempool search would
/// return it.
pub fn mempool_transaction(
    hash: TxHash,
    nonce: u64,
    max_fee: u64,
    priority_fee: u64,
    block_number: Option<u64>,
) -> Transaction {
    Transaction {
        hash,
        nonce: U256::from(nonce),
        max_fee_per_gas: Some(U256::from(max_fee)),
        max_priority_fee_per_gas: Some(U256::from(priority_fee)),
        block_number: block_number.map(U64::from),
        to: Some(Address::repeat_byte(0xCC)),
        ..Default::default()
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn current_block_height(&self) -> BotResult<u64> {
        self.check_rpc()?;
        Ok(*self.height.lock().unwrap())
    }

    async fn get_pings(&self, from_block: u64, to_block: u64) -> BotResult<Vec<PingLog>> {
        self.check_rpc()?;
        Ok(self
            .pings
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.block_number >= from_block && p.block_number <= to_block)
            .copied()
            .collect())
    }

    async fn get_pongs(&self, from_block: u64, to_block: u64) -> BotResult<Vec<PongLog>> {
        self.check_rpc()?;
        Ok(self
            .pongs
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.block_number >= from_block && p.block_number <= to_block)
            .copied()
            .collect())
    }

    async fn get_transaction(&self, tx_hash: TxHash) -> BotResult<Option<Transaction>> {
        self.check_rpc()?;
        Ok(self.transactions.lock().unwrap().get(&tx_hash).cloned())
    }

    fn wallet_address(&self) -> Address {
        self.wallet
    }

    async fn wallet_nonce(&self) -> BotResult<u64> {
        self.check_rpc()?;
        Ok(*self.next_nonce.lock().unwrap())
    }

    async fn refresh_fee_data(&self) -> BotResult<FeeData> {
        self.check_rpc()?;
        *self.fee_refreshes.lock().unwrap() += 1;
        Ok(*self.fee_data.lock().unwrap())
    }

    async fn current_fee_data(&self) -> BotResult<FeeData> {
        Ok(*self.fee_data.lock().unwrap())
    }

    async fn pong(&self, ping_hash: TxHash, nonce: Option<u64>) -> BotResult<PongReceipt> {
        self.check_rpc()?;
        let nonce = nonce.unwrap_or(*self.next_nonce.lock().unwrap());
        {
            let mut next = self.next_nonce.lock().unwrap();
            *next = (*next).max(nonce + 1);
        }
        let pong_hash = self.fresh_pong_hash();
        self.submitted.lock().unwrap().push(SubmittedPong {
            ping_hash,
            nonce,
            pong_hash,
        });
        Ok(PongReceipt { pong_hash, nonce })
    }

    async fn search_mempool_transaction(&self, tx_hash: TxHash) -> BotResult<Option<MempoolTx>> {
        self.check_rpc()?;
        Ok(self
            .mempool
            .lock()
            .unwrap()
            .get(&tx_hash)
            .map(|(provider_name, tx)| MempoolTx {
                provider_name: provider_name.clone(),
                tx: tx.clone(),
            }))
    }

    async fn bump_transaction_fees(
        &self,
        stale_tx: &Transaction,
        new_fees: FeeData,
        provider_name: &str,
    ) -> BotResult<()> {
        self.check_rpc()?;
        self.bumps
            .lock()
            .unwrap()
            .push((stale_tx.hash, new_fees, provider_name.to_string()));
        Ok(())
    }

    async fn scan_my_mempool_pongs(&self) -> BotResult<Vec<MempoolPong>> {
        self.check_rpc()?;
        Ok(self.mempool_pongs.lock().unwrap().clone())
    }
}
