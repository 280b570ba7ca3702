//! Domain model (ids, listings, outcomes, errors, aggregate state).

pub mod errors;
pub mod ids;
pub mod listing;
pub mod outcome;
pub mod state;

pub use self::errors::{AggregateError, FetchError};
pub use self::ids::{InvocationId, RunId};
pub use self::listing::{ArtifactListing, FileInfo};
pub use self::outcome::{FetchOutcome, OutcomeKind};
pub use self::state::{AggregateState, AggregateStatus, ApplyResult, RunKeySet};
