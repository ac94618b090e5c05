//! Fan-out of a group request to its member repositories.

use crate::config::DispatchTimeouts;
use crate::errors::DispatchError;
use crate::metrics_defs::{MEMBER_RESPONSES, status_class};
use crate::repository::{DispatchedRepositories, Repository, RepositoryName, RequestContext};
use crate::response::MemberResponse;
use async_trait::async_trait;
use http::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};

/// Member responses keyed by repository name.
///
/// Iteration order carries no meaning; callers reorder by declared membership.
pub type MemberResponses = HashMap<RepositoryName, MemberResponse>;

/// Queries the members of a group and returns one response per member.
///
/// Members already in `dispatched` are skipped and have no entry in the result.
#[async_trait]
pub trait MemberDispatcher: Send + Sync {
    async fn get_all(
        &self,
        context: &RequestContext,
        members: &[Arc<Repository>],
        dispatched: &DispatchedRepositories,
    ) -> Result<MemberResponses, DispatchError>;
}

/// Serves a request against a single member repository.
///
/// `dispatched` already contains the member itself along with its siblings.
#[async_trait]
pub trait MemberHandler: Send + Sync {
    async fn get(
        &self,
        context: &RequestContext,
        member: &Arc<Repository>,
        dispatched: &DispatchedRepositories,
    ) -> Result<MemberResponse, DispatchError>;
}

/// Dispatches to all members concurrently, bounding each member and the
/// fan-out as a whole.
///
/// Member failures are converted into non-200 responses:
/// - handler error → 502
/// - member timeout or fan-out deadline → 504
/// - panicked task → 500
///
/// Dropping the returned future aborts every outstanding member task.
#[derive(Clone)]
pub struct ParallelDispatcher {
    handler: Arc<dyn MemberHandler>,
    timeouts: DispatchTimeouts,
}

impl ParallelDispatcher {
    pub fn new(handler: Arc<dyn MemberHandler>, timeouts: DispatchTimeouts) -> Self {
        Self { handler, timeouts }
    }

    fn spawn_member_tasks(
        &self,
        context: &RequestContext,
        members: Vec<Arc<Repository>>,
        dispatched: Arc<DispatchedRepositories>,
    ) -> (
        JoinSet<(RepositoryName, Result<MemberResponse, DispatchError>)>,
        HashMap<tokio::task::Id, RepositoryName>,
    ) {
        let mut join_set = JoinSet::new();
        let mut task_members = HashMap::new();
        let member_timeout = Duration::from_secs(self.timeouts.member_timeout_secs);

        for member in members {
            let handler = self.handler.clone();
            let context = context.clone();
            let dispatched = dispatched.clone();
            let name = member.name().to_string();

            let abort_handle = join_set.spawn(async move {
                let name = member.name().to_string();
                let result = match timeout(
                    member_timeout,
                    handler.get(&context, &member, &dispatched),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::MemberTimeout(name.clone())),
                };
                (name, result)
            });

            task_members.insert(abort_handle.id(), name);
        }

        (join_set, task_members)
    }

    fn into_member_response(
        name: &str,
        result: Result<MemberResponse, DispatchError>,
    ) -> MemberResponse {
        match result {
            Ok(response) => response,
            Err(e @ DispatchError::MemberTimeout(_)) => {
                tracing::warn!(repository = %name, error = %e, "Member timed out");
                MemberResponse::status(StatusCode::GATEWAY_TIMEOUT)
            }
            Err(e) => {
                tracing::warn!(repository = %name, error = %e, "Member request failed");
                MemberResponse::status(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

#[async_trait]
impl MemberDispatcher for ParallelDispatcher {
    async fn get_all(
        &self,
        context: &RequestContext,
        members: &[Arc<Repository>],
        dispatched: &DispatchedRepositories,
    ) -> Result<MemberResponses, DispatchError> {
        // Every member dispatched here is visible to nested groups further down
        let mut nested = dispatched.clone();
        let mut targets = Vec::with_capacity(members.len());
        for member in members {
            if nested.add(member.name()) {
                targets.push(member.clone());
            } else {
                tracing::debug!(repository = %member.name(), "Skipping already dispatched member");
            }
        }

        let mut responses = MemberResponses::with_capacity(targets.len());
        if targets.is_empty() {
            return Ok(responses);
        }

        let (mut join_set, mut task_members) =
            self.spawn_member_tasks(context, targets, Arc::new(nested));

        let deadline = sleep(Duration::from_secs(self.timeouts.total_timeout_secs));
        tokio::pin!(deadline);

        while !join_set.is_empty() {
            tokio::select! {
                join_result = join_set.join_next_with_id() => {
                    match join_result {
                        Some(Ok((task_id, (name, result)))) => {
                            task_members.remove(&task_id);
                            let response = Self::into_member_response(&name, result);
                            responses.insert(name, response);
                        }
                        Some(Err(e)) => {
                            tracing::error!("Member task failed: {e}");
                            if let Some(name) = task_members.remove(&e.id()) {
                                responses.insert(
                                    name,
                                    MemberResponse::status(StatusCode::INTERNAL_SERVER_ERROR),
                                );
                            }
                        }
                        None => break,
                    }
                }
                _ = &mut deadline => {
                    tracing::warn!(
                        "Dispatch deadline reached, aborting {} member tasks",
                        join_set.len()
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }

        for (_, name) in task_members.drain() {
            responses.insert(name, MemberResponse::status(StatusCode::GATEWAY_TIMEOUT));
        }

        for response in responses.values() {
            counter!(MEMBER_RESPONSES, "status" => status_class(response.status)).increment(1);
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use hyper::body::Bytes;
    use std::sync::Mutex;

    /// Serves canned responses per member, optionally after a delay
    #[derive(Default)]
    struct MockHandler {
        responses: HashMap<String, MemberResponse>,
        delays: HashMap<String, Duration>,
        failing: Vec<String>,
        panicking: Vec<String>,
        seen: Mutex<Vec<(String, DispatchedRepositories)>>,
    }

    #[async_trait]
    impl MemberHandler for MockHandler {
        async fn get(
            &self,
            _context: &RequestContext,
            member: &Arc<Repository>,
            dispatched: &DispatchedRepositories,
        ) -> Result<MemberResponse, DispatchError> {
            let name = member.name().to_string();
            self.seen
                .lock()
                .unwrap()
                .push((name.clone(), dispatched.clone()));

            if let Some(delay) = self.delays.get(&name) {
                tokio::time::sleep(*delay).await;
            }
            if self.panicking.contains(&name) {
                panic!("member handler panicked");
            }
            if self.failing.contains(&name) {
                return Err(DispatchError::MemberFailed(name, "connection refused".into()));
            }
            Ok(self
                .responses
                .get(&name)
                .cloned()
                .unwrap_or_else(MemberResponse::not_found))
        }
    }

    fn members(names: &[&str]) -> Vec<Arc<Repository>> {
        names
            .iter()
            .map(|n| Arc::new(Repository::hosted(*n)))
            .collect()
    }

    fn context() -> RequestContext {
        RequestContext::get("/packages.json".parse().unwrap())
    }

    fn timeouts(member: u64, total: u64) -> DispatchTimeouts {
        DispatchTimeouts {
            member_timeout_secs: member,
            total_timeout_secs: total,
        }
    }

    fn ok(body: &'static str) -> MemberResponse {
        MemberResponse::ok(Payload::Plain(Bytes::from_static(body.as_bytes())))
    }

    #[tokio::test]
    async fn test_collects_all_members() {
        let handler = Arc::new(MockHandler {
            responses: HashMap::from([("a".to_string(), ok("A")), ("c".to_string(), ok("C"))]),
            ..Default::default()
        });
        let dispatcher = ParallelDispatcher::new(handler.clone(), timeouts(5, 10));

        let responses = dispatcher
            .get_all(&context(), &members(&["a", "b", "c"]), &DispatchedRepositories::new())
            .await
            .unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses["a"], ok("A"));
        assert_eq!(responses["b"].status, StatusCode::NOT_FOUND);
        assert_eq!(responses["c"], ok("C"));

        // Each member sees itself and its siblings as dispatched
        for (_, dispatched) in handler.seen.lock().unwrap().iter() {
            assert!(dispatched.contains("a"));
            assert!(dispatched.contains("b"));
            assert!(dispatched.contains("c"));
        }
    }

    #[tokio::test]
    async fn test_skips_already_dispatched() {
        let handler = Arc::new(MockHandler::default());
        let dispatcher = ParallelDispatcher::new(handler.clone(), timeouts(5, 10));

        let mut dispatched = DispatchedRepositories::new();
        dispatched.add("a");

        let responses = dispatcher
            .get_all(&context(), &members(&["a", "b", "b"]), &dispatched)
            .await
            .unwrap();

        assert_eq!(responses.len(), 1);
        assert!(responses.contains_key("b"));
        assert_eq!(handler.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_member_failure_becomes_bad_gateway() {
        let handler = Arc::new(MockHandler {
            responses: HashMap::from([("a".to_string(), ok("A"))]),
            failing: vec!["b".to_string()],
            ..Default::default()
        });
        let dispatcher = ParallelDispatcher::new(handler, timeouts(5, 10));

        let responses = dispatcher
            .get_all(&context(), &members(&["a", "b"]), &DispatchedRepositories::new())
            .await
            .unwrap();

        assert_eq!(responses["a"].status, StatusCode::OK);
        assert_eq!(responses["b"].status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_panicked_member_becomes_internal_error() {
        let handler = Arc::new(MockHandler {
            responses: HashMap::from([("a".to_string(), ok("A"))]),
            panicking: vec!["b".to_string()],
            ..Default::default()
        });
        let dispatcher = ParallelDispatcher::new(handler, timeouts(5, 10));

        let responses = dispatcher
            .get_all(&context(), &members(&["a", "b"]), &DispatchedRepositories::new())
            .await
            .unwrap();

        assert_eq!(responses["a"].status, StatusCode::OK);
        assert_eq!(responses["b"].status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_member_times_out() {
        let handler = Arc::new(MockHandler {
            responses: HashMap::from([("a".to_string(), ok("A")), ("b".to_string(), ok("B"))]),
            delays: HashMap::from([("b".to_string(), Duration::from_secs(60))]),
            ..Default::default()
        });
        let dispatcher = ParallelDispatcher::new(handler, timeouts(1, 10));

        let responses = dispatcher
            .get_all(&context(), &members(&["a", "b"]), &DispatchedRepositories::new())
            .await
            .unwrap();

        assert_eq!(responses["a"], ok("A"));
        assert_eq!(responses["b"].status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_deadline_aborts_outstanding_members() {
        let handler = Arc::new(MockHandler {
            responses: HashMap::from([("a".to_string(), ok("A")), ("b".to_string(), ok("B"))]),
            delays: HashMap::from([
                ("a".to_string(), Duration::from_secs(3)),
                ("b".to_string(), Duration::from_secs(3)),
            ]),
            ..Default::default()
        });
        // Each member is within its own timeout but the fan-out deadline is shorter
        let dispatcher = ParallelDispatcher::new(handler, timeouts(2, 2));

        let started = tokio::time::Instant::now();
        let responses = dispatcher
            .get_all(&context(), &members(&["a", "b"]), &DispatchedRepositories::new())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(responses.len(), 2);
        assert!(
            responses
                .values()
                .all(|r| r.status == StatusCode::GATEWAY_TIMEOUT)
        );
    }

    #[tokio::test]
    async fn test_no_members() {
        let dispatcher = ParallelDispatcher::new(Arc::new(MockHandler::default()), timeouts(1, 1));
        let responses = dispatcher
            .get_all(&context(), &[], &DispatchedRepositories::new())
            .await
            .unwrap();
        assert!(responses.is_empty());
    }
}
