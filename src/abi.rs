// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wire-format constants for the observed contract: the `Ping()` and
//! `Pong(bytes32)` event topics and the `pong(bytes32)` call selector, all
//! derived from the canonical signatures at first use.

use ethers::types::{Bytes, TxHash, H256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

pub static PING_EVENT_TOPIC: Lazy<H256> = Lazy::new(|| H256::from(keccak256("Ping()")));

pub static PONG_EVENT_TOPIC: Lazy<H256> = Lazy::new(|| H256::from(keccak256("Pong(bytes32)")));

/// First 4 bytes of `keccak256("pong(bytes32)")`.
pub static PONG_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| {
    let digest = keccak256("pong(bytes32)");
    [digest[0], digest[1], digest[2], digest[3]]
});

const PONG_CALLDATA_LEN: usize = 4 + 32;

/// Calldata for `pong(pingHash)`: selector followed by the 32-byte argument.
pub fn pong_calldata(ping_hash: TxHash) -> Bytes {
    let mut data = Vec::with_capacity(PONG_CALLDATA_LEN);
    data.extend_from_slice(&*PONG_SELECTOR);
    data.extend_from_slice(ping_hash.as_bytes());
    Bytes::from(data)
}

/// True when the input carries the `pong(bytes32)` selector, whether or not
/// the rest of the calldata is well formed.
pub fn is_pong_call(input: &[u8]) -> bool {
    input.len() >= 4 && input[..4] == *PONG_SELECTOR
}

/// Extracts the ping hash from `pong(bytes32)` calldata. Returns `None` for
/// inputs of the wrong shape; callers decide whether that is benign.
pub fn decode_pong_calldata(input: &[u8]) -> Option<TxHash> {
    if input.len() != PONG_CALLDATA_LEN || !is_pong_call(input) {
        return None;
    }
    Some(TxHash::from_slice(&input[4..]))
}
