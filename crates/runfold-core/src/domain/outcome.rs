//! Outcome model: the settlement of one fetch.
//!
//! This module does not know about invocations or channels. It only defines
//! the shape of a settled fetch so the merge step can fold it into state.

use serde::{Deserialize, Serialize};

use super::errors::FetchError;
use super::listing::ArtifactListing;

/// Classification of a settled fetch.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / FAILURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Result of one fetch for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchOutcome {
    Success(ArtifactListing),
    Failure(FetchError),
}

impl FetchOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::Failure(_) => OutcomeKind::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<ArtifactListing, FetchError>> for FetchOutcome {
    fn from(result: Result<ArtifactListing, FetchError>) -> Self {
        match result {
            Ok(listing) => Self::Success(listing),
            Err(err) => Self::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_required_names() {
        let s = serde_json::to_string(&OutcomeKind::Success).unwrap();
        assert_eq!(s, "\"SUCCESS\"");

        let s = serde_json::to_string(&OutcomeKind::Failure).unwrap();
        assert_eq!(s, "\"FAILURE\"");
    }

    #[test]
    fn outcome_from_result() {
        let ok: FetchOutcome = Ok(ArtifactListing::new("run-1", vec![])).into();
        assert_eq!(ok.kind(), OutcomeKind::Success);
        assert!(ok.is_success());

        let err: FetchOutcome = Err(FetchError::network("Network error")).into();
        assert_eq!(err.kind(), OutcomeKind::Failure);
    }

    #[test]
    fn outcome_is_tagged_enum() {
        let o = FetchOutcome::Failure(FetchError::other("boom"));
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["kind"], "FAILURE");
        assert_eq!(v["value"]["kind"], "other");
    }
}
