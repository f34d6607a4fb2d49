// Error taxonomy for the workflow engine.

use thiserror::Error;

use crate::store::StoreError;
use crate::workflow::types::TestStatus;

/// Fetching services, components, or results failed. Recoverable by
/// retrying the load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch components for service {service_id}: {source}")]
    ComponentFetch {
        service_id: u64,
        source: StoreError,
    },

    #[error("test descriptor names no services")]
    EmptyDescriptor,
}

/// Local precondition failure. Never reaches the backend.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{count} component(s) missing result value or unit")]
    Unfilled { count: usize },

    #[error("component {component_id} is missing result value or unit")]
    MissingFields { component_id: u64 },

    #[error("no component {component_id} in service {service_id}")]
    UnknownComponent { service_id: u64, component_id: u64 },

    #[error("no test loaded")]
    NotLoaded,
}

/// Outcome of a successful (or partially successful) batch save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Every targeted component persisted.
    Full,
    /// The store saved some components and rejected the rest; the rejected
    /// ones carry a `save_error` flag and must be re-edited and resubmitted.
    Partial { saved: usize, failed: usize },
}

/// The store rejected or could not process a result batch.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("test is {status}, results can no longer be saved")]
    Terminal { status: TestStatus },

    #[error("nothing to save: the batch is empty")]
    EmptyBatch,

    #[error("result store rejected the batch: {message}")]
    Rejected {
        message: String,
        /// Component ids the backend named as missing, when its message
        /// carried them.
        missing_component_ids: Vec<u64>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The completion transition failed after the allowed retry.
#[derive(Debug, Error)]
pub enum CompleteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("test is {status} and cannot be completed")]
    InvalidStatus { status: TestStatus },

    #[error("completion rejected: {message}")]
    Rejected { message: String },

    #[error("completion failed after retry: {source}")]
    Store { source: StoreError },
}

/// An illegal lifecycle move, or a store failure while performing one.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("cannot move test from {from} to {to}")]
    Illegal { from: TestStatus, to: TestStatus },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The backend sometimes reports a successful status transition as an error
/// string. Detect that message and surface the status it names, so callers
/// can treat the "failure" as the success it actually was. Replicated for
/// compatibility, not by choice.
pub fn disguised_success(message: &str) -> Option<TestStatus> {
    if message.contains("updated to COMPLETED") {
        Some(TestStatus::Completed)
    } else if message.contains("updated to RESULTED") {
        Some(TestStatus::Resulted)
    } else {
        None
    }
}

/// Pull component ids out of the backend's
/// `Missing results for components: [1, 2, 3]` rejection message.
pub fn parse_missing_component_ids(message: &str) -> Vec<u64> {
    let Some(start) = message.find("Missing results for components:") else {
        return Vec::new();
    };
    let rest = &message[start..];
    let Some(open) = rest.find('[') else {
        return Vec::new();
    };
    let Some(close) = rest[open..].find(']') else {
        return Vec::new();
    };
    rest[open + 1..open + close]
        .split(',')
        .filter_map(|id| id.trim().parse::<u64>().ok())
        .collect()
}
