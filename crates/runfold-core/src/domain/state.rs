//! Aggregate state: the externally observed result of one invocation.
//!
//! Design:
//! - One `AggregateState` per invocation. A new key set builds a new state,
//!   it is never reset in place.
//! - All transitions happen through `apply` (not direct field access), so the
//!   merge policy lives in one place.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::AggregateError;
use super::ids::{InvocationId, RunId};
use super::listing::ArtifactListing;
use super::outcome::FetchOutcome;

/// The set of unique run ids of one invocation.
///
/// Comparison is by membership only: order and duplicates in the caller's
/// input do not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunKeySet(BTreeSet<RunId>);

impl RunKeySet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, run_id: &RunId) -> bool {
        self.0.contains(run_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunId> {
        self.0.iter()
    }
}

impl<T: Into<RunId>> FromIterator<T> for RunKeySet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for RunKeySet {
    type Item = RunId;
    type IntoIter = std::collections::btree_set::IntoIter<RunId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// What `AggregateState::apply` did with a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// Listing stored for the key.
    Stored,
    /// Failure counted; recorded as the state's error.
    ErrorRecorded,
    /// Failure counted; an earlier error was already recorded.
    ErrorDropped,
    /// Key is not part of this invocation.
    UnknownKey,
    /// Key already settled in this invocation.
    AlreadySettled,
}

impl ApplyResult {
    /// Whether the settlement changed the state.
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Stored | Self::ErrorRecorded | Self::ErrorDropped)
    }
}

/// Observed state of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateState {
    invocation: InvocationId,
    started_at: DateTime<Utc>,
    keys: RunKeySet,

    /// Listings of the keys whose fetch succeeded.
    results_by_key: BTreeMap<RunId, ArtifactListing>,

    /// First failure of this invocation.
    error: Option<AggregateError>,

    /// Keys whose fetch settled (success or failure).
    settled: BTreeSet<RunId>,

    is_loading: bool,
}

impl AggregateState {
    /// Fresh state for a new invocation. An empty key set is already settled.
    pub fn new(invocation: InvocationId, started_at: DateTime<Utc>, keys: RunKeySet) -> Self {
        let is_loading = !keys.is_empty();
        Self {
            invocation,
            started_at,
            keys,
            results_by_key: BTreeMap::new(),
            error: None,
            settled: BTreeSet::new(),
            is_loading,
        }
    }

    /// Fold one settlement into the state.
    ///
    /// - success: store the listing (once per key)
    /// - failure: first error wins, the key stays absent from the results
    /// - `is_loading` turns false once every key has settled
    pub fn apply(&mut self, run_id: RunId, outcome: FetchOutcome) -> ApplyResult {
        if !self.keys.contains(&run_id) {
            return ApplyResult::UnknownKey;
        }
        if self.settled.contains(&run_id) {
            return ApplyResult::AlreadySettled;
        }

        let result = match outcome {
            FetchOutcome::Success(listing) => {
                self.results_by_key.insert(run_id.clone(), listing);
                ApplyResult::Stored
            }
            FetchOutcome::Failure(cause) => {
                if self.error.is_some() {
                    ApplyResult::ErrorDropped
                } else {
                    self.error = Some(AggregateError::FetchFailed {
                        run_id: run_id.clone(),
                        cause,
                    });
                    ApplyResult::ErrorRecorded
                }
            }
        };

        self.settled.insert(run_id);
        self.is_loading = self.settled.len() < self.keys.len();
        result
    }

    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn keys(&self) -> &RunKeySet {
        &self.keys
    }

    pub fn results_by_key(&self) -> &BTreeMap<RunId, ArtifactListing> {
        &self.results_by_key
    }

    pub fn get(&self, run_id: &RunId) -> Option<&ArtifactListing> {
        self.results_by_key.get(run_id)
    }

    pub fn error(&self) -> Option<&AggregateError> {
        self.error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn expected(&self) -> usize {
        self.keys.len()
    }

    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    pub fn is_settled(&self, run_id: &RunId) -> bool {
        self.settled.contains(run_id)
    }

    /// Serializable view for reporting.
    pub fn status(&self) -> AggregateStatus {
        AggregateStatus {
            invocation: self.invocation,
            started_at: self.started_at,
            is_loading: self.is_loading,
            expected: self.expected(),
            settled: self.settled_count(),
            error: self.error.clone(),
            results: self.results_by_key.clone(),
        }
    }
}

/// Aggregate status for reporting (CLI output, logs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatus {
    pub invocation: InvocationId,
    pub started_at: DateTime<Utc>,
    pub is_loading: bool,
    pub expected: usize,
    pub settled: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AggregateError>,

    pub results: BTreeMap<RunId, ArtifactListing>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::FetchError;
    use crate::domain::listing::FileInfo;
    use rstest::rstest;
    use ulid::Ulid;

    fn state_for(ids: &[&str]) -> AggregateState {
        AggregateState::new(
            InvocationId::from_ulid(Ulid::new()),
            Utc::now(),
            ids.iter().copied().collect(),
        )
    }

    fn listing(run: &str) -> ArtifactListing {
        ArtifactListing::new(run, vec![FileInfo::file("artifact1.txt", 300)])
    }

    #[rstest]
    #[case::same_order(&["a", "b"], &["a", "b"], true)]
    #[case::reordered(&["a", "b"], &["b", "a"], true)]
    #[case::duplicates(&["a", "a", "b"], &["b", "a"], true)]
    #[case::extra_key(&["a", "b"], &["a", "b", "c"], false)]
    #[case::different_key(&["a"], &["b"], false)]
    fn key_sets_compare_by_membership(
        #[case] left: &[&str],
        #[case] right: &[&str],
        #[case] equal: bool,
    ) {
        let l: RunKeySet = left.iter().copied().collect();
        let r: RunKeySet = right.iter().copied().collect();
        assert_eq!(l == r, equal);
    }

    #[test]
    fn empty_key_set_is_settled_immediately() {
        let state = state_for(&[]);
        assert!(!state.is_loading());
        assert!(state.results_by_key().is_empty());
        assert!(state.error().is_none());
        assert_eq!(state.expected(), 0);
    }

    #[test]
    fn loading_until_every_key_settles() {
        let mut state = state_for(&["run-1", "run-2"]);
        assert!(state.is_loading());

        state.apply(RunId::new("run-2"), FetchOutcome::Success(listing("run-2")));
        assert!(state.is_loading());
        assert_eq!(state.settled_count(), 1);

        state.apply(RunId::new("run-1"), FetchOutcome::Success(listing("run-1")));
        assert!(!state.is_loading());
        assert_eq!(state.get(&RunId::new("run-1")), Some(&listing("run-1")));
        assert_eq!(state.get(&RunId::new("run-2")), Some(&listing("run-2")));
    }

    #[test]
    fn first_error_wins() {
        let mut state = state_for(&["a", "b", "c"]);

        let r = state.apply(RunId::new("b"), FetchOutcome::Failure(FetchError::network("first")));
        assert_eq!(r, ApplyResult::ErrorRecorded);
        let r = state.apply(RunId::new("a"), FetchOutcome::Failure(FetchError::network("second")));
        assert_eq!(r, ApplyResult::ErrorDropped);
        state.apply(RunId::new("c"), FetchOutcome::Success(listing("c")));

        assert!(!state.is_loading());
        let err = state.error().unwrap();
        assert_eq!(err.run_id(), &RunId::new("b"));
        assert_eq!(err.cause(), &FetchError::network("first"));
        assert_eq!(state.results_by_key().len(), 1);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut state = state_for(&["a"]);
        let r = state.apply(RunId::new("zzz"), FetchOutcome::Success(listing("zzz")));
        assert_eq!(r, ApplyResult::UnknownKey);
        assert!(!r.is_applied());
        assert!(state.results_by_key().is_empty());
        assert!(state.is_loading());
    }

    #[test]
    fn second_settlement_for_a_key_is_ignored() {
        let mut state = state_for(&["a", "b"]);
        state.apply(RunId::new("a"), FetchOutcome::Success(listing("first")));
        let r = state.apply(RunId::new("a"), FetchOutcome::Success(listing("second")));

        assert_eq!(r, ApplyResult::AlreadySettled);
        assert_eq!(state.get(&RunId::new("a")), Some(&listing("first")));
        assert!(state.is_loading());
    }

    #[test]
    fn status_view_serializes() {
        let mut state = state_for(&["run_1"]);
        state.apply(
            RunId::new("run_1"),
            FetchOutcome::Failure(FetchError::network("Network error")),
        );

        let v = serde_json::to_value(state.status()).unwrap();
        assert_eq!(v["is_loading"], false);
        assert_eq!(v["expected"], 1);
        assert_eq!(v["settled"], 1);
        assert!(v["results"].as_object().unwrap().is_empty());
        assert_eq!(v["error"]["FetchFailed"]["run_id"], "run_1");
    }
}
