// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stale-pong reconciliation: pongs that have not mined within the timeout
//! are either resubmitted (dropped from every mempool) or replaced with
//! higher fees (still pending but outpriced).

use crate::error::BotResult;
use crate::gateway::{ChainGateway, FeeData};
use crate::metrics::BotMetrics;
use crate::store::ExchangeStore;
use crate::types::Exchange;
use ethers::types::U256;
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn process_stale_pongs<G: ChainGateway>(
    gateway: &G,
    store: &ExchangeStore,
    timeout: Duration,
    metrics: &BotMetrics,
) -> BotResult<()> {
    let stale = store.get_stale_pong_issued_exchanges(timeout)?;
    if stale.is_empty() {
        debug!("no stale pongs");
        return Ok(());
    }

    warn!(count = stale.len(), "reconciling stale pongs");
    let current = gateway.refresh_fee_data().await?;

    for exchange in stale {
        let Exchange::PongIssued {
            ping_hash,
            ping_block,
            pong_hash,
            pong_nonce,
            ..
        } = exchange
        else {
            continue;
        };

        match gateway.search_mempool_transaction(pong_hash).await? {
            None => {
                // Dropped everywhere: submit again under a fresh nonce
                warn!(?ping_hash, ?pong_hash, "pong vanished from every mempool, reissuing");
                let receipt = gateway.pong(ping_hash, None).await?;
                store.put_pong_issued(
                    ping_hash,
                    ping_block,
                    receipt.pong_hash,
                    receipt.nonce,
                    None,
                )?;
                metrics.pongs_reissued_total.inc();
            }
            Some(found) if found.tx.block_number.is_some() => {
                // It mined after all; the next pong pass will complete it
                debug!(?pong_hash, block = ?found.tx.block_number, "stale pong already mined");
            }
            Some(found) => {
                let tx_max_fee = found.tx.max_fee_per_gas.unwrap_or_default();
                let tx_priority_fee = found.tx.max_priority_fee_per_gas.unwrap_or_default();
                match calculate_bump_fees(tx_max_fee, tx_priority_fee, current) {
                    None => {
                        info!(
                            ?pong_hash,
                            provider = %found.provider_name,
                            "pending pong already pays the going rate"
                        );
                    }
                    Some(new_fees) => {
                        gateway
                            .bump_transaction_fees(&found.tx, new_fees, &found.provider_name)
                            .await?;
                        // Same record, fresh timer
                        store.put_pong_issued(ping_hash, ping_block, pong_hash, pong_nonce, None)?;
                        metrics.fee_bumps_total.inc();
                    }
                }
            }
        }
    }
    Ok(())
}

/// Replacement fees for a pending transaction, or `None` when its fees
/// already meet the current estimate.
///
/// The base fee the estimator assumed is reconstructed as
/// `(current.maxFee - current.priorityFee) / 2`; the replacement must also
/// clear the relay minimum of a 10% bump over the old max fee, rounded up.
/// All arithmetic is integral for reproducibility.
pub fn calculate_bump_fees(
    tx_max_fee: U256,
    tx_priority_fee: U256,
    current: FeeData,
) -> Option<FeeData> {
    if tx_max_fee >= current.max_fee_per_gas && tx_priority_fee >= current.max_priority_fee_per_gas
    {
        return None;
    }

    let new_priority = current.max_priority_fee_per_gas.max(tx_priority_fee);
    let base_fee: U256 = current
        .max_fee_per_gas
        .saturating_sub(current.max_priority_fee_per_gas)
        / 2;
    let adjusted_max = base_fee * U256::from(2) + new_priority;
    let min_replacement = tx_max_fee + (tx_max_fee * 10 + 99) / 100;
    let new_max = adjusted_max.max(min_replacement).max(current.max_fee_per_gas);

    Some(FeeData {
        max_fee_per_gas: new_max,
        max_priority_fee_per_gas: new_priority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ExchangeStore;
    use crate::test_utils::{mempool_transaction, MockGateway};
    use crate::types::Exchange;
    use ethers::types::TxHash;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fees(max: u64, priority: u64) -> FeeData {
        FeeData {
            max_fee_per_gas: U256::from(max),
            max_priority_fee_per_gas: U256::from(priority),
        }
    }

    #[test]
    fn test_bump_floor_binds() {
        // 10% round-up over maxFee 11 is 13, above the estimator's 12
        let bumped = calculate_bump_fees(U256::from(11), U256::from(3), fees(12, 6)).unwrap();
        assert_eq!(bumped, fees(13, 6));
    }

    #[test]
    fn test_no_replacement_when_fees_already_cover() {
        assert!(calculate_bump_fees(U256::from(12), U256::from(6), fees(12, 6)).is_none());
        assert!(calculate_bump_fees(U256::from(20), U256::from(9), fees(12, 6)).is_none());
    }

    #[test]
    fn test_adjusted_max_binds_for_cheap_tx() {
        // Old fees tiny; the estimator's own max dominates the 10% floor
        let bumped = calculate_bump_fees(U256::from(10), U256::from(1), fees(100, 2)).unwrap();
        assert_eq!(bumped, fees(100, 2));
    }

    #[test]
    fn test_priority_kept_when_tx_priority_higher() {
        // priority regressed in the estimate but maxFee moved up
        let bumped = calculate_bump_fees(U256::from(50), U256::from(40), fees(100, 2)).unwrap();
        // base = (100-2)/2 = 49, adjusted = 98 + 40 = 138, floor = 50 + 5 = 55
        assert_eq!(bumped, fees(138, 40));
    }

    #[test]
    fn test_round_up_on_small_values() {
        // 10% of 5 rounds up to 1
        let bumped = calculate_bump_fees(U256::from(5), U256::from(1), fees(6, 2)).unwrap();
        // base = 2, adjusted = 6, floor = 5 + 1 = 6, current max = 6
        assert_eq!(bumped, fees(6, 2));
    }

    fn hash(byte: u8) -> TxHash {
        TxHash::repeat_byte(byte)
    }

    fn setup() -> (TempDir, Arc<MockGateway>, Arc<ExchangeStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ExchangeStore::open(&dir.path().join("db")).unwrap());
        let gateway = Arc::new(MockGateway::new());
        (dir, gateway, store)
    }

    fn seed_stale(store: &ExchangeStore) {
        let old = crate::store::unix_now().saturating_sub(3600);
        store
            .put_pong_issued(hash(1), 50, hash(9), 4, Some(old))
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_pong_reissued_with_fresh_record() {
        let (_dir, gateway, store) = setup();
        seed_stale(&store);
        *gateway.next_nonce.lock().unwrap() = 12;

        process_stale_pongs(
            gateway.as_ref(),
            &store,
            Duration::from_secs(900),
            &BotMetrics::for_testing(),
        )
        .await
        .unwrap();

        let submitted = gateway.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].ping_hash, hash(1));
        assert_eq!(submitted[0].nonce, 12);

        match store.get_exchange(&hash(1)).unwrap() {
            Some(Exchange::PongIssued {
                pong_hash,
                pong_nonce,
                pong_timestamp,
                ..
            }) => {
                assert_eq!(pong_hash, submitted[0].pong_hash);
                assert_ne!(pong_hash, hash(9));
                assert_eq!(pong_nonce, 12);
                assert!(pong_timestamp >= crate::store::unix_now() - 5);
            }
            other => panic!("expected PongIssued, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mined_pong_left_alone() {
        let (_dir, gateway, store) = setup();
        seed_stale(&store);
        gateway.mempool.lock().unwrap().insert(
            hash(9),
            (
                "alchemy".to_string(),
                mempool_transaction(hash(9), 4, 11, 3, Some(70)),
            ),
        );

        process_stale_pongs(
            gateway.as_ref(),
            &store,
            Duration::from_secs(900),
            &BotMetrics::for_testing(),
        )
        .await
        .unwrap();

        assert!(gateway.submitted.lock().unwrap().is_empty());
        assert!(gateway.bumps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_pong_bumped_and_timer_restarted() {
        let (_dir, gateway, store) = setup();
        seed_stale(&store);
        *gateway.fee_data.lock().unwrap() = fees(12, 6);
        gateway.mempool.lock().unwrap().insert(
            hash(9),
            (
                "infura".to_string(),
                mempool_transaction(hash(9), 4, 11, 3, None),
            ),
        );

        process_stale_pongs(
            gateway.as_ref(),
            &store,
            Duration::from_secs(900),
            &BotMetrics::for_testing(),
        )
        .await
        .unwrap();

        let bumps = gateway.bumps.lock().unwrap().clone();
        assert_eq!(bumps.len(), 1);
        assert_eq!(bumps[0].1, fees(13, 6));
        assert_eq!(bumps[0].2, "infura");
        assert!(gateway.submitted.lock().unwrap().is_empty());

        // Record keeps its hash and nonce; only the timer restarted
        match store.get_exchange(&hash(1)).unwrap() {
            Some(Exchange::PongIssued {
                pong_hash,
                pong_nonce,
                pong_timestamp,
                ..
            }) => {
                assert_eq!(pong_hash, hash(9));
                assert_eq!(pong_nonce, 4);
                assert!(pong_timestamp >= crate::store::unix_now() - 5);
            }
            other => panic!("expected PongIssued, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_competitive_pending_pong_untouched() {
        let (_dir, gateway, store) = setup();
        seed_stale(&store);
        *gateway.fee_data.lock().unwrap() = fees(12, 6);
        gateway.mempool.lock().unwrap().insert(
            hash(9),
            (
                "alchemy".to_string(),
                mempool_transaction(hash(9), 4, 20, 9, None),
            ),
        );

        process_stale_pongs(
            gateway.as_ref(),
            &store,
            Duration::from_secs(900),
            &BotMetrics::for_testing(),
        )
        .await
        .unwrap();

        assert!(gateway.submitted.lock().unwrap().is_empty());
        assert!(gateway.bumps.lock().unwrap().is_empty());
    }
}
