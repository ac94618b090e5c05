//! Group repository aggregation for Composer package repositories.
//!
//! A group repository has no storage of its own. A metadata read against it
//! is fanned out to every member, the successful payloads are merged by a
//! format-specific [`MergeStrategy`], and the result carries the latest
//! last-modified of its inputs.
//!
//! ```text
//!                 GET /packages.json
//!                        │
//!                        ▼
//!               ┌─────────────────┐
//!               │ GroupAggregator │
//!               └────────┬────────┘
//!                        │ get_all (members, dispatched)
//!                        ▼
//!             ┌─────────────────────┐
//!             │ ParallelDispatcher  │
//!             └──┬───────┬───────┬──┘
//!                ▼       ▼       ▼
//!             hosted  mirror  nested group
//!              200     404      200
//!                │               │
//!                └──────┬────────┘
//!                       ▼ declared member order
//!               ┌─────────────────┐
//!               │  MergeStrategy  │
//!               └────────┬────────┘
//!                        ▼
//!            200 + merged body + Last-Modified
//! ```
//!
//! Responses:
//! - 200 with the merged body
//! - 200 with no body when the merge strategy produced nothing
//! - 404 when no member answered 200 with a payload
//!
//! Dispatch and merge failures are returned as [`AggregateError`].

#[macro_use]
pub mod metrics_defs;

pub mod aggregator;
pub mod composer;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod filesystem;
pub mod merge;
pub mod nested;
pub mod payload;
pub mod repository;
pub mod response;
pub mod topology;

pub use aggregator::GroupAggregator;
pub use composer::ComposerJsonMerger;
pub use dispatcher::{MemberDispatcher, MemberHandler, MemberResponses, ParallelDispatcher};
pub use errors::{AggregateError, DispatchError, MergeError};
pub use merge::MergeStrategy;
pub use nested::NestedGroupHandler;
pub use payload::{Attributes, Content, Payload};
pub use repository::{DispatchedRepositories, Repository, RepositoryName, RequestContext};
pub use response::{MemberResponse, Response};
