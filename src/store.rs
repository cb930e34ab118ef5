// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Durable exchange store over an embedded sled database.
//!
//! Two namespaces: the root tree holds the iteration singleton under
//! `"iteration"`; the `"exchanges"` tree maps the 0x-prefixed ping hash to a
//! JSON-encoded exchange record. Every write flushes before returning, so a
//! successful `put` is on disk before the caller's next RPC side effect.

use crate::error::{BotError, BotResult};
use crate::types::{Exchange, Iteration};
use ethers::types::TxHash;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const ITERATION_KEY: &[u8] = b"iteration";
const EXCHANGES_TREE: &str = "exchanges";

pub struct ExchangeStore {
    db: sled::Db,
    exchanges: sled::Tree,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn exchange_key(ping_hash: &TxHash) -> Vec<u8> {
    format!("{ping_hash:?}").into_bytes()
}

impl ExchangeStore {
    pub fn open(path: &Path) -> BotResult<Self> {
        let db = sled::open(path)?;
        let exchanges = db.open_tree(EXCHANGES_TREE)?;
        Ok(Self { db, exchanges })
    }

    pub fn get_iteration(&self) -> BotResult<Option<Iteration>> {
        match self.db.get(ITERATION_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Overwrites the singleton. Written with `Started` before any side
    /// effect of a tick and with `Completed` as the tick's last write.
    pub fn set_iteration(&self, iteration: &Iteration) -> BotResult<()> {
        self.db
            .insert(ITERATION_KEY, serde_json::to_vec(iteration)?)?;
        self.flush()
    }

    pub fn get_exchange(&self, ping_hash: &TxHash) -> BotResult<Option<Exchange>> {
        match self.exchanges.get(exchange_key(ping_hash))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Records a freshly observed ping. Refuses to downgrade a record that
    /// already progressed past `Detected`; replays of the same range hit this
    /// on every recovery.
    pub fn put_ping_detected(&self, ping_hash: TxHash, ping_block: u64) -> BotResult<bool> {
        if let Some(existing) = self.get_exchange(&ping_hash)? {
            if !matches!(existing, Exchange::Detected { .. }) {
                debug!(
                    ?ping_hash,
                    state = existing.state_name(),
                    "not downgrading exchange to detected"
                );
                return Ok(false);
            }
        }
        self.put_exchange(&Exchange::Detected {
            ping_hash,
            ping_block,
        })?;
        Ok(true)
    }

    /// `pong_timestamp` defaults to now; the stale reconciler keys off it.
    pub fn put_pong_issued(
        &self,
        ping_hash: TxHash,
        ping_block: u64,
        pong_hash: TxHash,
        pong_nonce: u64,
        pong_timestamp: Option<u64>,
    ) -> BotResult<()> {
        self.put_exchange(&Exchange::PongIssued {
            ping_hash,
            ping_block,
            pong_hash,
            pong_nonce,
            pong_timestamp: pong_timestamp.unwrap_or_else(unix_now),
        })
    }

    pub fn put_completed_exchange(
        &self,
        ping_hash: TxHash,
        ping_block: Option<u64>,
        pong_hash: TxHash,
        pong_block: u64,
        pong_nonce: u64,
        pong_timestamp: Option<u64>,
    ) -> BotResult<()> {
        self.put_exchange(&Exchange::Completed {
            ping_hash,
            ping_block,
            pong_hash,
            pong_block,
            pong_nonce,
            pong_timestamp,
        })
    }

    /// All `Detected` records, in key order.
    pub fn get_ping_detected_exchanges(&self) -> BotResult<Vec<Exchange>> {
        let mut detected = Vec::new();
        for record in self.scan()? {
            if matches!(record, Exchange::Detected { .. }) {
                detected.push(record);
            }
        }
        Ok(detected)
    }

    /// `PongIssued` records whose submission is at least `timeout` old.
    pub fn get_stale_pong_issued_exchanges(&self, timeout: Duration) -> BotResult<Vec<Exchange>> {
        let now = unix_now();
        let mut stale = Vec::new();
        for record in self.scan()? {
            if let Exchange::PongIssued { pong_timestamp, .. } = record {
                if now.saturating_sub(pong_timestamp) >= timeout.as_secs() {
                    stale.push(record);
                }
            }
        }
        Ok(stale)
    }

    /// Deletes every `Completed` record in one atomic batch and returns what
    /// was removed.
    pub fn remove_completed_exchanges(&self) -> BotResult<Vec<Exchange>> {
        let mut removed = Vec::new();
        let mut batch = sled::Batch::default();
        for entry in self.exchanges.iter() {
            let (key, raw) = entry?;
            let record: Exchange = serde_json::from_slice(&raw)?;
            if matches!(record, Exchange::Completed { .. }) {
                batch.remove(key);
                removed.push(record);
            }
        }
        if !removed.is_empty() {
            self.exchanges.apply_batch(batch)?;
            self.flush()?;
        }
        Ok(removed)
    }

    /// Flushes and releases dirty pages. Safe to call more than once.
    pub fn close(&self) -> BotResult<()> {
        self.flush()
    }

    fn put_exchange(&self, exchange: &Exchange) -> BotResult<()> {
        let key = exchange_key(&exchange.ping_hash());
        self.exchanges.insert(key, serde_json::to_vec(exchange)?)?;
        self.flush()
    }

    fn scan(&self) -> BotResult<Vec<Exchange>> {
        let mut records = Vec::new();
        for entry in self.exchanges.iter() {
            let (_, raw) = entry?;
            records.push(serde_json::from_slice::<Exchange>(&raw)?);
        }
        Ok(records)
    }

    fn flush(&self) -> BotResult<()> {
        self.db.flush().map(|_| ()).map_err(BotError::from)
    }
}
