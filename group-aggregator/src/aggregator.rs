//! Group aggregation: fan a read out to every member, then merge what came back.

use crate::dispatcher::MemberDispatcher;
use crate::errors::{AggregateError, Result};
use crate::merge::MergeStrategy;
use crate::metrics_defs::{GROUP_REQUESTS, MERGE_DURATION};
use crate::payload::Payload;
use crate::repository::{DispatchedRepositories, Repository, RequestContext};
use crate::response::{MemberResponse, Response};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// Serves metadata reads for group repositories.
///
/// Holds no per-request state, so one instance can serve concurrent requests
/// for any number of groups.
#[derive(Clone)]
pub struct GroupAggregator {
    dispatcher: Arc<dyn MemberDispatcher>,
    merger: Arc<dyn MergeStrategy>,
}

impl GroupAggregator {
    pub fn new(dispatcher: Arc<dyn MemberDispatcher>, merger: Arc<dyn MergeStrategy>) -> Self {
        Self { dispatcher, merger }
    }

    /// Aggregates the members of `repository` into a single response.
    ///
    /// Returns `Response::NotFound` when no member answered 200 with a payload,
    /// in which case the merge strategy is not invoked. Dispatch and merge
    /// failures are returned as errors.
    pub async fn aggregate(
        &self,
        context: &RequestContext,
        repository: &Repository,
        dispatched: &DispatchedRepositories,
    ) -> Result<Response> {
        let result = self.do_aggregate(context, repository, dispatched).await;

        let outcome = match &result {
            Ok(Response::Ok(Some(_))) => "merged",
            Ok(Response::Ok(None)) => "empty",
            Ok(Response::NotFound) => "not_found",
            Err(_) => "error",
        };
        counter!(GROUP_REQUESTS, "outcome" => outcome).increment(1);

        result
    }

    async fn do_aggregate(
        &self,
        context: &RequestContext,
        repository: &Repository,
        dispatched: &DispatchedRepositories,
    ) -> Result<Response> {
        let members = repository
            .group_facet()
            .ok_or_else(|| AggregateError::MissingGroupFacet(repository.name().to_string()))?
            .members();

        let mut responses = self
            .dispatcher
            .get_all(context, members, dispatched)
            .await?;

        // Declared member order, regardless of how the responses were collected
        let payloads: Vec<Payload> = members
            .iter()
            .filter_map(|member| responses.remove(member.name()))
            .filter_map(MemberResponse::into_usable_payload)
            .collect();

        if payloads.is_empty() {
            tracing::debug!(
                repository = %repository.name(),
                path = %context.path(),
                "No member returned a usable payload"
            );
            return Ok(Response::NotFound);
        }

        let started = Instant::now();
        let merged = self.merger.merge(repository, &payloads);
        histogram!(MERGE_DURATION).record(started.elapsed().as_secs_f64());

        let mut content = merged.inspect_err(|e| {
            tracing::error!(
                repository = %repository.name(),
                merger = self.merger.name(),
                error = %e,
                "Failed to merge member payloads"
            );
        })?;

        if let Some(content) = content.as_mut() {
            let last_modified = latest_last_modified(&payloads).unwrap_or_else(Utc::now);
            content.attributes_mut().set_last_modified(last_modified);
        }

        tracing::debug!(
            repository = %repository.name(),
            path = %context.path(),
            payloads = payloads.len(),
            "Merged member payloads"
        );

        Ok(Response::Ok(content))
    }
}

/// Latest last-modified across payloads carrying attributes.
///
/// A payload with attributes but no last-modified counts as modified now,
/// evaluated separately for each payload. Returns None when no payload
/// carries attributes.
fn latest_last_modified(payloads: &[Payload]) -> Option<DateTime<Utc>> {
    payloads
        .iter()
        .filter_map(Payload::attributes)
        .map(|attributes| attributes.last_modified().unwrap_or_else(Utc::now))
        .max()
}
