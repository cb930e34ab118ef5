// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type BotResult<T> = Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    // Network failures, rate limits, provider 5xx. The iteration aborts and the
    // next tick re-enters from the block before the aborted range.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    // Provider returned something structurally wrong (log without a tx hash,
    // logs from the wrong contract).
    #[error("provider error: {0}")]
    Provider(String),

    // Embedded store failure. Fatal: the process exits non-zero and the next
    // start cold-recovers.
    #[error("storage error: {0}")]
    Storage(String),

    // On-chain or mempool state that contradicts what must hold (a pong log
    // whose transaction cannot be retrieved, unparseable pong calldata from
    // our own wallet). Loud, aborts the iteration.
    #[error("semantic violation: {0}")]
    Semantic(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BotError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            BotError::TransientProvider(_) => "transient_provider_error",
            BotError::Provider(_) => "provider_error",
            BotError::Storage(_) => "storage_error",
            BotError::Semantic(_) => "semantic_violation",
            BotError::Config(_) => "config_error",
        }
    }

    /// Fatal errors terminate the process instead of waiting for the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Storage(_) | BotError::Config(_))
    }
}

impl From<sled::Error> for BotError {
    fn from(e: sled::Error) -> Self {
        BotError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Storage(format!("record encoding: {e}"))
    }
}
