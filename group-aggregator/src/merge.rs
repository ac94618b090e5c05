use crate::errors::MergeError;
use crate::payload::{Content, Payload};
use crate::repository::Repository;

/// Format-specific logic combining the payloads of several members into one.
///
/// Payloads arrive in declared member order (first = highest priority).
/// Returning `Ok(None)` yields an empty-body success for the group.
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn merge(
        &self,
        repository: &Repository,
        payloads: &[Payload],
    ) -> Result<Option<Content>, MergeError>;
}
