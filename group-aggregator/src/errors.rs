use crate::repository::RepositoryName;
use thiserror::Error;

/// Result type alias for aggregation operations
pub type Result<T, E = AggregateError> = std::result::Result<T, E>;

/// Errors surfaced by a group aggregation.
///
/// Anything returned here is left for the HTTP layer to map to a 5xx response.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Repository {0} has no group facet")]
    MissingGroupFacet(RepositoryName),

    #[error("Member dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),
}

/// Errors raised while dispatching a request to member repositories
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Member {0} request failed: {1}")]
    MemberFailed(RepositoryName, String),

    #[error("Member {0} timed out")]
    MemberTimeout(RepositoryName),

    #[error("IO error for member {0}: {1}")]
    Io(RepositoryName, #[source] std::io::Error),

    #[error("Nested group {0} failed: {1}")]
    NestedGroup(RepositoryName, Box<AggregateError>),
}

/// Errors raised by a merge strategy while combining member payloads
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Invalid JSON payload for {repository}: {source}")]
    InvalidJson {
        repository: RepositoryName,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected payload shape for {repository}: {reason}")]
    UnexpectedShape {
        repository: RepositoryName,
        reason: String,
    },

    #[error("Failed to serialize merged payload: {0}")]
    Serialize(#[from] serde_json::Error),
}
