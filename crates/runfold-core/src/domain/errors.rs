//! Errors - fetch の失敗と集約エラー
//!
//! - `FetchError`: fetcher 実装が返す失敗。aggregator は中身を解釈せずそのまま運ぶ
//! - `AggregateError`: 集約状態に載るエラー（どの run の失敗かを付ける）

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::RunId;

/// Failure reported by an `ArtifactFetcher` for a single run.
///
/// The variants are a vocabulary for fetcher implementations. The aggregator
/// never branches on them.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("{0}")]
    Network(String),

    #[error("status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("decode failed: {0}")]
    Decode(String),

    /// The fetch task died before producing a result.
    #[error("fetch aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// The single error kind surfaced in `AggregateState`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AggregateError {
    #[error("fetch failed for run {run_id}: {cause}")]
    FetchFailed { run_id: RunId, cause: FetchError },
}

impl AggregateError {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::FetchFailed { run_id, .. } => run_id,
        }
    }

    pub fn cause(&self) -> &FetchError {
        match self {
            Self::FetchFailed { cause, .. } => cause,
        }
    }
}
