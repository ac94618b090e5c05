use crate::aggregator::GroupAggregator;
use crate::config::DispatchTimeouts;
use crate::dispatcher::{MemberHandler, ParallelDispatcher};
use crate::errors::DispatchError;
use crate::merge::MergeStrategy;
use crate::repository::{DispatchedRepositories, Repository, RequestContext};
use crate::response::MemberResponse;
use async_trait::async_trait;
use std::sync::Arc;

/// Member handler that serves group members by aggregating them in turn.
///
/// Hosted members go to the wrapped leaf handler. A group member is answered
/// by a nested aggregation that inherits the dispatched set. A member that an
/// ancestor group already dispatched is skipped; sibling groups sharing a
/// member each query it.
#[derive(Clone)]
pub struct NestedGroupHandler {
    leaf: Arc<dyn MemberHandler>,
    merger: Arc<dyn MergeStrategy>,
    timeouts: DispatchTimeouts,
}

impl NestedGroupHandler {
    pub fn new(
        leaf: Arc<dyn MemberHandler>,
        merger: Arc<dyn MergeStrategy>,
        timeouts: DispatchTimeouts,
    ) -> Self {
        Self {
            leaf,
            merger,
            timeouts,
        }
    }

    /// Builds an aggregator that dispatches members through this handler
    pub fn aggregator(&self) -> GroupAggregator {
        let dispatcher = ParallelDispatcher::new(Arc::new(self.clone()), self.timeouts);
        GroupAggregator::new(Arc::new(dispatcher), self.merger.clone())
    }
}

#[async_trait]
impl MemberHandler for NestedGroupHandler {
    async fn get(
        &self,
        context: &RequestContext,
        member: &Arc<Repository>,
        dispatched: &DispatchedRepositories,
    ) -> Result<MemberResponse, DispatchError> {
        if !member.is_group() {
            return self.leaf.get(context, member, dispatched).await;
        }

        tracing::debug!(repository = %member.name(), "Aggregating nested group");
        let response = self
            .aggregator()
            .aggregate(context, member, dispatched)
            .await
            .map_err(|e| DispatchError::NestedGroup(member.name().to_string(), Box::new(e)))?;

        Ok(response.into_member_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::ComposerJsonMerger;
    use crate::payload::{Content, Payload};
    use chrono::{TimeZone, Utc};
    use http::StatusCode;
    use serde_json::{Value as JsonValue, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves a fixed JSON document per hosted repository and counts calls
    struct JsonLeaf {
        documents: HashMap<String, (JsonValue, chrono::DateTime<Utc>)>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MemberHandler for JsonLeaf {
        async fn get(
            &self,
            _context: &RequestContext,
            member: &Arc<Repository>,
            _dispatched: &DispatchedRepositories,
        ) -> Result<MemberResponse, DispatchError> {
            self.calls.lock().unwrap().push(member.name().to_string());
            Ok(match self.documents.get(member.name()) {
                Some((document, last_modified)) => MemberResponse::ok(Payload::Content(
                    Content::new(serde_json::to_vec(document).unwrap())
                        .with_last_modified(*last_modified),
                )),
                None => MemberResponse::not_found(),
            })
        }
    }

    fn at(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn handler(leaf: Arc<JsonLeaf>) -> NestedGroupHandler {
        NestedGroupHandler::new(
            leaf,
            Arc::new(ComposerJsonMerger::new()),
            DispatchTimeouts::default(),
        )
    }

    #[tokio::test]
    async fn test_nested_groups_are_merged_once() {
        let shared = Arc::new(Repository::hosted("shared"));
        let hosted = Arc::new(Repository::hosted("hosted"));
        let inner = Arc::new(Repository::group("inner", vec![shared.clone()]));
        // `shared` is reachable directly and through `inner`
        let outer = Repository::group("outer", vec![hosted, inner, shared]);

        let leaf = Arc::new(JsonLeaf {
            documents: HashMap::from([
                (
                    "hosted".to_string(),
                    (json!({"packages": {"acme/a": {"1.0": {}}}}), at(1)),
                ),
                (
                    "shared".to_string(),
                    (json!({"packages": {"acme/b": {"1.0": {}}}}), at(3)),
                ),
            ]),
            calls: Mutex::new(Vec::new()),
        });

        let response = handler(leaf.clone())
            .aggregator()
            .aggregate(
                &RequestContext::get("/packages.json".parse().unwrap()),
                &outer,
                &DispatchedRepositories::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content = response.content().unwrap();
        let merged: JsonValue = serde_json::from_slice(content.body()).unwrap();
        assert!(merged["packages"].get("acme/a").is_some());
        assert!(merged["packages"].get("acme/b").is_some());
        assert_eq!(content.attributes().last_modified(), Some(at(3)));

        // The outer group already dispatched `shared`, so `inner` has nothing to query
        let mut calls = leaf.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["hosted".to_string(), "shared".to_string()]);
    }

    #[tokio::test]
    async fn test_sibling_groups_each_query_shared_member() {
        let shared = Arc::new(Repository::hosted("shared"));
        let left = Arc::new(Repository::group("left", vec![shared.clone()]));
        let right = Arc::new(Repository::group("right", vec![shared]));
        let top = Repository::group("top", vec![left, right]);

        let leaf = Arc::new(JsonLeaf {
            documents: HashMap::from([(
                "shared".to_string(),
                (json!({"packages": {"acme/b": {"1.0": {}}}}), at(2)),
            )]),
            calls: Mutex::new(Vec::new()),
        });

        let response = handler(leaf.clone())
            .aggregator()
            .aggregate(
                &RequestContext::get("/packages.json".parse().unwrap()),
                &top,
                &DispatchedRepositories::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.content().unwrap().attributes().last_modified(),
            Some(at(2))
        );

        // Siblings dispatch from the same snapshot, so neither sees the other's fetch
        assert_eq!(
            *leaf.calls.lock().unwrap(),
            vec!["shared".to_string(), "shared".to_string()]
        );
    }

    /// Records how many member fetches started and how many ran to completion
    #[derive(Default)]
    struct SlowLeaf {
        started: AtomicUsize,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl MemberHandler for SlowLeaf {
        async fn get(
            &self,
            _context: &RequestContext,
            _member: &Arc<Repository>,
            _dispatched: &DispatchedRepositories,
        ) -> Result<MemberResponse, DispatchError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(MemberResponse::not_found())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_aggregation_aborts_member_fetches() {
        let a = Arc::new(Repository::hosted("a"));
        let b = Arc::new(Repository::hosted("b"));
        let inner = Arc::new(Repository::group("inner", vec![b]));
        let outer = Repository::group("outer", vec![a, inner]);

        let leaf = Arc::new(SlowLeaf::default());
        let handler = NestedGroupHandler::new(
            leaf.clone(),
            Arc::new(ComposerJsonMerger::new()),
            DispatchTimeouts::default(),
        );
        let context = RequestContext::get("/packages.json".parse().unwrap());
        let aggregator = handler.aggregator();

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            aggregator.aggregate(&context, &outer, &DispatchedRepositories::new()),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(leaf.started.load(Ordering::SeqCst), 2);

        // Well past the leaf delay; aborted fetches never resume
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(leaf.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nested_group_without_content_is_not_found() {
        let missing = Arc::new(Repository::hosted("missing"));
        let inner = Arc::new(Repository::group("inner", vec![missing]));

        let leaf = Arc::new(JsonLeaf {
            documents: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        });

        let response = handler(leaf)
            .get(
                &RequestContext::get("/p/acme/a.json".parse().unwrap()),
                &inner,
                &DispatchedRepositories::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.payload.is_none());
    }
}
