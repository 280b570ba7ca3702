//! InMemoryArtifactFetcher - 開発用の fetcher
//!
//! # 学習ポイント
//! - std Mutex で応答表と呼び出し履歴を保護（ロックを跨いで await しない）
//! - run ごとの遅延で settlement の順序を制御する

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactListing, FetchError, RunId};
use crate::ports::ArtifactFetcher;

/// One recorded call to `list_artifacts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub run_id: RunId,
    pub path: Option<String>,
}

/// Scripted in-memory fetcher.
///
/// Runs without a scripted response fail with `FetchError::NotFound`.
///
/// # 使用例
/// ```ignore
/// let fetcher = InMemoryArtifactFetcher::new()
///     .with_listing("run-1", ArtifactListing::new("run-1", vec![]))
///     .with_error("run-2", FetchError::network("Network error"))
///     .with_latency("run-1", Duration::from_millis(50));
/// ```
#[derive(Default)]
pub struct InMemoryArtifactFetcher {
    responses: Mutex<HashMap<RunId, Result<ArtifactListing, FetchError>>>,
    latency: HashMap<RunId, Duration>,
    default_latency: Duration,
    calls: Mutex<Vec<FetchCall>>,
}

impl InMemoryArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(self, run_id: impl Into<RunId>, listing: ArtifactListing) -> Self {
        self.set_response(run_id, Ok(listing));
        self
    }

    pub fn with_error(self, run_id: impl Into<RunId>, error: FetchError) -> Self {
        self.set_response(run_id, Err(error));
        self
    }

    pub fn with_latency(mut self, run_id: impl Into<RunId>, latency: Duration) -> Self {
        self.latency.insert(run_id.into(), latency);
        self
    }

    pub fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Replace the scripted response for a run. Later calls see the new value.
    pub fn set_response(
        &self,
        run_id: impl Into<RunId>,
        response: Result<ArtifactListing, FetchError>,
    ) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id.into(), response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn calls_for(&self, run_id: &RunId) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| &c.run_id == run_id)
            .count()
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Build a fetcher from a fixture document.
    pub fn from_fixture(fixture: FetchFixture) -> Self {
        let mut fetcher = Self::new()
            .with_default_latency(Duration::from_millis(fixture.default_latency_ms.unwrap_or(0)));
        for (run_id, ms) in fixture.latency_ms {
            fetcher = fetcher.with_latency(run_id, Duration::from_millis(ms));
        }
        for (run_id, entry) in fixture.runs {
            fetcher.set_response(run_id, entry.into_response());
        }
        fetcher
    }

    fn latency_for(&self, run_id: &RunId) -> Duration {
        self.latency
            .get(run_id)
            .copied()
            .unwrap_or(self.default_latency)
    }
}

#[async_trait]
impl ArtifactFetcher for InMemoryArtifactFetcher {
    async fn list_artifacts(
        &self,
        run_id: &RunId,
        path: Option<&str>,
    ) -> Result<ArtifactListing, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FetchCall {
                run_id: run_id.clone(),
                path: path.map(str::to_string),
            });

        let latency = self.latency_for(run_id);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        // ロックは sleep の後で取る（await を跨がない）
        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::NotFound(run_id.clone())));

        let listing = response?;
        Ok(match path {
            Some(path) => subdirectory(listing, path),
            None => listing,
        })
    }
}

/// Keep only the entries under `path`.
fn subdirectory(listing: ArtifactListing, path: &str) -> ArtifactListing {
    let prefix = format!("{}/", path.trim_end_matches('/'));
    let files = listing
        .files
        .into_iter()
        .filter(|f| f.path.starts_with(&prefix))
        .collect();
    ArtifactListing {
        root_uri: listing.root_uri,
        files,
    }
}

/// Fixture document for the in-memory fetcher.
///
/// ```json
/// {
///   "runs": {
///     "run-1": { "listing": { "root_uri": "run-1", "files": [] } },
///     "run-2": { "error": "Network error" }
///   },
///   "latency_ms": { "run-1": 20 }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchFixture {
    #[serde(default)]
    pub runs: BTreeMap<RunId, FixtureEntry>,

    #[serde(default)]
    pub latency_ms: BTreeMap<RunId, u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_latency_ms: Option<u64>,
}

impl FetchFixture {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_json_str(&raw)?)
    }
}

/// Scripted response of one run in a fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureEntry {
    Listing(ArtifactListing),
    Error(String),
}

impl FixtureEntry {
    fn into_response(self) -> Result<ArtifactListing, FetchError> {
        match self {
            Self::Listing(listing) => Ok(listing),
            Self::Error(message) => Err(FetchError::Network(message)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture: {0}")]
    Parse(#[from] serde_json::Error),
}
