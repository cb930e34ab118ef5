// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persistent record types: the per-ping exchange lifecycle and the iteration
//! descriptor. Both are closed sum types discriminated by a JSON tag so the
//! store layout survives process restarts and version upgrades.

use ethers::types::TxHash;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IterationState {
    Started,
    Completed,
}

/// One bounded pass over a block range, or a recovery phase-transition marker.
///
/// A single descriptor exists at any time. It is written with
/// `state = Started` before any side effect of the pass and rewritten with
/// `state = Completed` once every phase succeeded, so an unclean stop is
/// visible to the next planner call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Iteration {
    #[serde(rename_all = "camelCase")]
    Normal {
        state: IterationState,
        from_block: u64,
        to_block: u64,
    },
    #[serde(rename_all = "camelCase")]
    RecoveryStart {
        state: IterationState,
        to_block: u64,
    },
    #[serde(rename_all = "camelCase")]
    Recovery {
        state: IterationState,
        from_block: u64,
        to_block: u64,
        /// Chain head captured when recovery began; recovery runs until the
        /// scanned range reaches it.
        recovery_until_block: u64,
    },
    #[serde(rename_all = "camelCase")]
    RecoveryEnd {
        state: IterationState,
        to_block: u64,
    },
}

impl Iteration {
    pub fn state(&self) -> IterationState {
        match self {
            Iteration::Normal { state, .. }
            | Iteration::RecoveryStart { state, .. }
            | Iteration::Recovery { state, .. }
            | Iteration::RecoveryEnd { state, .. } => *state,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state() == IterationState::Started
    }

    pub fn to_block(&self) -> u64 {
        match self {
            Iteration::Normal { to_block, .. }
            | Iteration::RecoveryStart { to_block, .. }
            | Iteration::Recovery { to_block, .. }
            | Iteration::RecoveryEnd { to_block, .. } => *to_block,
        }
    }

    /// Only `Normal` and `Recovery` scan a range; the markers have no start.
    pub fn from_block(&self) -> Option<u64> {
        match self {
            Iteration::Normal { from_block, .. } | Iteration::Recovery { from_block, .. } => {
                Some(*from_block)
            }
            _ => None,
        }
    }

    pub fn recovery_until_block(&self) -> Option<u64> {
        match self {
            Iteration::Recovery {
                recovery_until_block,
                ..
            } => Some(*recovery_until_block),
            _ => None,
        }
    }

    /// Same descriptor with `state = Completed`; the last write of a tick.
    pub fn completed(&self) -> Self {
        let mut done = self.clone();
        match &mut done {
            Iteration::Normal { state, .. }
            | Iteration::RecoveryStart { state, .. }
            | Iteration::Recovery { state, .. }
            | Iteration::RecoveryEnd { state, .. } => *state = IterationState::Completed,
        }
        done
    }

    /// Stable label for logs and metrics, matching the persisted tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Iteration::Normal { .. } => "normal",
            Iteration::RecoveryStart { .. } => "recoveryStart",
            Iteration::Recovery { .. } => "recovery",
            Iteration::RecoveryEnd { .. } => "recoveryEnd",
        }
    }
}

/// Lifecycle of one ping/pong pair, keyed by the ping transaction hash.
///
/// Transitions are forward-only: `Detected` to `PongIssued` to `Completed`.
/// The mempool sweep of recovery may install a `PongIssued` record where none
/// existed; nothing ever demotes a `Completed` record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Exchange {
    #[serde(rename_all = "camelCase")]
    Detected { ping_hash: TxHash, ping_block: u64 },
    #[serde(rename_all = "camelCase")]
    PongIssued {
        ping_hash: TxHash,
        ping_block: u64,
        pong_hash: TxHash,
        pong_nonce: u64,
        /// Unix seconds of the submission; drives the stale-pong pass.
        pong_timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        ping_hash: TxHash,
        /// Absent when recovery learned of the completion without ever
        /// observing the original ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        ping_block: Option<u64>,
        pong_hash: TxHash,
        pong_block: u64,
        pong_nonce: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        pong_timestamp: Option<u64>,
    },
}

impl Exchange {
    pub fn ping_hash(&self) -> TxHash {
        match self {
            Exchange::Detected { ping_hash, .. }
            | Exchange::PongIssued { ping_hash, .. }
            | Exchange::Completed { ping_hash, .. } => *ping_hash,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Exchange::Detected { .. } => "detected",
            Exchange::PongIssued { .. } => "pongIssued",
            Exchange::Completed { .. } => "completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> TxHash {
        TxHash::repeat_byte(byte)
    }

    #[test]
    fn test_iteration_json_tags() {
        let it = Iteration::Recovery {
            state: IterationState::Started,
            from_block: 5,
            to_block: 10,
            recovery_until_block: 42,
        };
        let json = serde_json::to_value(&it).unwrap();
        assert_eq!(json["type"], "recovery");
        assert_eq!(json["state"], "started");
        assert_eq!(json["fromBlock"], 5);
        assert_eq!(json["recoveryUntilBlock"], 42);

        let back: Iteration = serde_json::from_value(json).unwrap();
        assert_eq!(back, it);
    }

    #[test]
    fn test_iteration_completed_preserves_fields() {
        let it = Iteration::Normal {
            state: IterationState::Started,
            from_block: 11,
            to_block: 180,
        };
        let done = it.completed();
        assert_eq!(done.state(), IterationState::Completed);
        assert_eq!(done.from_block(), Some(11));
        assert_eq!(done.to_block(), 180);
    }

    #[test]
    fn test_markers_have_no_from_block() {
        let start = Iteration::RecoveryStart {
            state: IterationState::Started,
            to_block: 99,
        };
        assert_eq!(start.from_block(), None);
        assert_eq!(start.recovery_until_block(), None);
        assert_eq!(start.kind(), "recoveryStart");
    }

    #[test]
    fn test_exchange_json_round_trip() {
        let ex = Exchange::PongIssued {
            ping_hash: hash(1),
            ping_block: 7,
            pong_hash: hash(2),
            pong_nonce: 3,
            pong_timestamp: 1_738_000_000,
        };
        let json = serde_json::to_value(&ex).unwrap();
        assert_eq!(json["state"], "pongIssued");
        assert_eq!(json["pongNonce"], 3);
        let back: Exchange = serde_json::from_value(json).unwrap();
        assert_eq!(back, ex);
    }

    #[test]
    fn test_completed_optional_fields_omitted() {
        let ex = Exchange::Completed {
            ping_hash: hash(1),
            ping_block: None,
            pong_hash: hash(2),
            pong_block: 19,
            pong_nonce: 0,
            pong_timestamp: None,
        };
        let json = serde_json::to_value(&ex).unwrap();
        assert!(json.get("pingBlock").is_none());
        assert!(json.get("pongTimestamp").is_none());
        let back: Exchange = serde_json::from_value(json).unwrap();
        assert_eq!(back, ex);
    }
}
