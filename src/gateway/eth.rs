// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Production gateway over ethers: one signer client per configured provider,
//! the first being the primary for reads, nonces, fees and submissions.

use crate::abi;
use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::gateway::rate_limited_provider::{
    new_rate_limited_provider, RateLimitedHttpProvider, RateLimiter,
};
use crate::gateway::{
    ChainGateway, FeeData, MempoolPong, MempoolTx, PingLog, PongLog, PongReceipt,
};
use crate::metrics::BotMetrics;
use async_trait::async_trait;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Middleware, Provider};
use ethers::signers::{LocalWallet, Signer, Wallet};
use ethers::types::{
    Address, BlockNumber, Eip1559TransactionRequest, Filter, Log, Transaction, TxHash, H256,
};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub type EthSigner = SignerMiddleware<Provider<RateLimitedHttpProvider>, Wallet<SigningKey>>;

struct ProviderSlot {
    name: String,
    client: Arc<EthSigner>,
}

pub struct EthGateway {
    providers: Vec<ProviderSlot>,
    contract_address: Address,
    wallet_address: Address,
    fee_data: RwLock<Option<FeeData>>,
    metrics: Arc<BotMetrics>,
}

impl EthGateway {
    pub async fn new(config: &BotConfig, metrics: Arc<BotMetrics>) -> BotResult<Self> {
        let endpoints = config.provider_endpoints();
        if endpoints.is_empty() {
            return Err(BotError::Config("no RPC providers enabled".to_string()));
        }

        let wallet: LocalWallet = config
            .wallet_private_key()
            .parse()
            .map_err(|e| BotError::Config(format!("invalid wallet key: {e:?}")))?;
        let wallet_address = wallet.address();

        let limiter = Arc::new(RateLimiter::new(config.providers_rps));
        let mut providers = Vec::with_capacity(endpoints.len());
        let mut chain_id = None;

        for (name, url) in endpoints {
            let provider = new_rate_limited_provider(&url, &name, limiter.clone(), metrics.clone())
                .map_err(|e| BotError::Config(format!("bad endpoint for {name}: {e}")))?;

            // Chain id is fetched once, through the primary, and binds every
            // signer so replacement transactions stay on the same chain.
            let id = match chain_id {
                Some(id) => id,
                None => {
                    let id = provider
                        .get_chainid()
                        .await
                        .map_err(transient)?
                        .as_u64();
                    chain_id = Some(id);
                    id
                }
            };

            let client = Arc::new(SignerMiddleware::new(
                provider,
                wallet.clone().with_chain_id(id),
            ));
            providers.push(ProviderSlot { name, client });
        }

        info!(
            wallet = ?wallet_address,
            contract = ?config.contract_address,
            chain_id = chain_id.unwrap_or_default(),
            providers = providers.len(),
            "gateway connected"
        );

        Ok(Self {
            providers,
            contract_address: config.contract_address,
            wallet_address,
            fee_data: RwLock::new(None),
            metrics,
        })
    }

    fn primary(&self) -> &ProviderSlot {
        &self.providers[0]
    }

    fn slot(&self, name: &str) -> Option<&ProviderSlot> {
        self.providers.iter().find(|slot| slot.name == name)
    }

    async fn fetch_logs(&self, topic: H256, from_block: u64, to_block: u64) -> BotResult<Vec<Log>> {
        let filter = Filter::new()
            .address(self.contract_address)
            .topic0(topic)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .primary()
            .client
            .get_logs(&filter)
            .await
            .map_err(transient)?;

        // Safeguard check that all events are emitted from the watched contract
        if logs.iter().any(|log| log.address != self.contract_address) {
            return Err(BotError::Provider(format!(
                "provider returned logs from a different contract (expected {:?})",
                self.contract_address
            )));
        }
        Ok(logs)
    }
}

fn transient<E: Debug>(e: E) -> BotError {
    BotError::TransientProvider(format!("{e:?}"))
}

fn log_position(log: &Log) -> BotResult<(TxHash, u64)> {
    let tx_hash = log.transaction_hash.ok_or_else(|| {
        BotError::Provider("provider returned a log without transaction_hash".to_string())
    })?;
    let block_number = log
        .block_number
        .ok_or_else(|| {
            BotError::Provider("provider returned a log without block_number".to_string())
        })?
        .as_u64();
    Ok((tx_hash, block_number))
}

#[async_trait]
impl ChainGateway for EthGateway {
    async fn current_block_height(&self) -> BotResult<u64> {
        let height = self
            .primary()
            .client
            .get_block_number()
            .await
            .map_err(transient)?;
        Ok(height.as_u64())
    }

    async fn get_pings(&self, from_block: u64, to_block: u64) -> BotResult<Vec<PingLog>> {
        let logs = self
            .fetch_logs(*abi::PING_EVENT_TOPIC, from_block, to_block)
            .await?;
        logs.iter()
            .map(|log| {
                let (tx_hash, block_number) = log_position(log)?;
                Ok(PingLog {
                    tx_hash,
                    block_number,
                })
            })
            .collect()
    }

    async fn get_pongs(&self, from_block: u64, to_block: u64) -> BotResult<Vec<PongLog>> {
        let logs = self
            .fetch_logs(*abi::PONG_EVENT_TOPIC, from_block, to_block)
            .await?;
        logs.iter()
            .map(|log| {
                let (tx_hash, block_number) = log_position(log)?;
                // The ping hash is the indexed argument; older tooling
                // occasionally leaves it unindexed, in which case it is the
                // first data word.
                let ping_hash = match log.topics.get(1) {
                    Some(topic) => *topic,
                    None if log.data.len() >= 32 => H256::from_slice(&log.data[..32]),
                    None => {
                        return Err(BotError::Semantic(format!(
                            "pong log {tx_hash:?} carries no ping hash"
                        )))
                    }
                };
                Ok(PongLog {
                    tx_hash,
                    block_number,
                    ping_hash,
                })
            })
            .collect()
    }

    async fn get_transaction(&self, tx_hash: TxHash) -> BotResult<Option<Transaction>> {
        self.primary()
            .client
            .get_transaction(tx_hash)
            .await
            .map_err(transient)
    }

    fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    async fn wallet_nonce(&self) -> BotResult<u64> {
        let nonce = self
            .primary()
            .client
            .get_transaction_count(self.wallet_address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(transient)?;
        Ok(nonce.as_u64())
    }

    async fn refresh_fee_data(&self) -> BotResult<FeeData> {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .primary()
            .client
            .estimate_eip1559_fees(None)
            .await
            .map_err(transient)?;
        let fresh = FeeData {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        };
        *self.fee_data.write().await = Some(fresh);
        debug!(?max_fee_per_gas, ?max_priority_fee_per_gas, "fee data refreshed");
        Ok(fresh)
    }

    async fn current_fee_data(&self) -> BotResult<FeeData> {
        let cached = *self.fee_data.read().await;
        cached.ok_or_else(|| BotError::Semantic("fee data consumed before any refresh".to_string()))
    }

    async fn pong(&self, ping_hash: TxHash, nonce: Option<u64>) -> BotResult<PongReceipt> {
        let fees = self.current_fee_data().await?;
        let nonce = match nonce {
            Some(nonce) => nonce,
            None => self.wallet_nonce().await?,
        };

        let request = Eip1559TransactionRequest::new()
            .to(self.contract_address)
            .data(abi::pong_calldata(ping_hash))
            .nonce(nonce)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

        let pending = self
            .primary()
            .client
            .send_transaction(request, None)
            .await
            .map_err(transient)?;
        let pong_hash = pending.tx_hash();
        self.metrics.pongs_submitted_total.inc();
        info!(?ping_hash, ?pong_hash, nonce, "pong submitted");
        Ok(PongReceipt { pong_hash, nonce })
    }

    async fn search_mempool_transaction(&self, tx_hash: TxHash) -> BotResult<Option<MempoolTx>> {
        for slot in &self.providers {
            match slot.client.get_transaction(tx_hash).await {
                Ok(Some(tx)) => {
                    debug!(?tx_hash, provider = %slot.name, "transaction found");
                    return Ok(Some(MempoolTx {
                        provider_name: slot.name.clone(),
                        tx,
                    }));
                }
                Ok(None) => continue,
                Err(e) => return Err(transient(e)),
            }
        }
        Ok(None)
    }

    async fn bump_transaction_fees(
        &self,
        stale_tx: &Transaction,
        new_fees: FeeData,
        provider_name: &str,
    ) -> BotResult<()> {
        let slot = self.slot(provider_name).ok_or_else(|| {
            BotError::Semantic(format!("unknown mempool provider: {provider_name}"))
        })?;
        let to = stale_tx.to.ok_or_else(|| {
            BotError::Semantic(format!(
                "pending transaction {:?} has no recipient",
                stale_tx.hash
            ))
        })?;

        // Same nonce, same payload, higher fees: an in-place replacement
        let request = Eip1559TransactionRequest::new()
            .to(to)
            .data(stale_tx.input.clone())
            .value(stale_tx.value)
            .nonce(stale_tx.nonce)
            .max_fee_per_gas(new_fees.max_fee_per_gas)
            .max_priority_fee_per_gas(new_fees.max_priority_fee_per_gas);

        let pending = slot
            .client
            .send_transaction(request, None)
            .await
            .map_err(transient)?;
        self.metrics.fee_bumps_total.inc();
        info!(
            stale = ?stale_tx.hash,
            replacement = ?pending.tx_hash(),
            provider = provider_name,
            "pending pong replaced with higher fees"
        );
        Ok(())
    }

    async fn scan_my_mempool_pongs(&self) -> BotResult<Vec<MempoolPong>> {
        let sweeps = self.providers.iter().map(|slot| {
            let name = slot.name.clone();
            let client = slot.client.clone();
            async move { (name, client.get_block_with_txs(BlockNumber::Pending).await) }
        });
        let blocks = futures::future::join_all(sweeps).await;

        // Last writer wins per ping hash; every record refers to this wallet's
        // own in-flight transactions, so disagreements are harmless.
        let mut pending_by_ping: HashMap<TxHash, (TxHash, u64)> = HashMap::new();
        for (name, result) in blocks {
            let block = match result.map_err(transient)? {
                Some(block) => block,
                None => {
                    debug!(provider = %name, "no pending block view");
                    continue;
                }
            };
            for tx in &block.transactions {
                if tx.from != self.wallet_address || tx.to != Some(self.contract_address) {
                    continue;
                }
                if !abi::is_pong_call(tx.input.as_ref()) {
                    debug!(hash = ?tx.hash, "ignoring non-pong call to the contract");
                    continue;
                }
                let ping_hash = abi::decode_pong_calldata(tx.input.as_ref()).ok_or_else(|| {
                    BotError::Semantic(format!("unparseable pong calldata in {:?}", tx.hash))
                })?;
                pending_by_ping.insert(ping_hash, (tx.hash, tx.nonce.as_u64()));
            }
        }

        if pending_by_ping.is_empty() {
            return Ok(Vec::new());
        }

        let mut pongs = Vec::with_capacity(pending_by_ping.len());
        for (ping_hash, (pong_hash, pong_nonce)) in pending_by_ping {
            // The answering pong proves the ping exists; a provider that
            // cannot return it is lying about one of the two.
            let ping_tx = self.get_transaction(ping_hash).await?.ok_or_else(|| {
                BotError::Semantic(format!("ping transaction {ping_hash:?} not found"))
            })?;
            let ping_block = ping_tx
                .block_number
                .ok_or_else(|| {
                    BotError::Semantic(format!("ping transaction {ping_hash:?} not yet mined"))
                })?
                .as_u64();
            pongs.push(MempoolPong {
                ping_hash,
                ping_block,
                pong_hash,
                pong_nonce,
            });
        }
        warn!(count = pongs.len(), "recovered in-flight pongs from mempool");
        Ok(pongs)
    }
}
