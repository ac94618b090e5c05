//! Repository identities and the request context handed through a group fan-out.

use http::{HeaderMap, Method, Uri};
use std::collections::HashSet;
use std::sync::Arc;

pub type RepositoryName = String;

/// A package repository, either backed by storage or by a set of members.
#[derive(Debug)]
pub struct Repository {
    name: RepositoryName,
    kind: RepositoryKind,
}

#[derive(Debug)]
pub enum RepositoryKind {
    /// Backed by real storage
    Hosted,
    /// Virtual union of its members
    Group(GroupFacet),
}

/// Ordered membership of a group repository (first = highest priority)
#[derive(Debug, Default)]
pub struct GroupFacet {
    members: Vec<Arc<Repository>>,
}

impl GroupFacet {
    pub fn new(members: Vec<Arc<Repository>>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[Arc<Repository>] {
        &self.members
    }
}

impl Repository {
    pub fn hosted(name: impl Into<RepositoryName>) -> Self {
        Self {
            name: name.into(),
            kind: RepositoryKind::Hosted,
        }
    }

    pub fn group(name: impl Into<RepositoryName>, members: Vec<Arc<Repository>>) -> Self {
        Self {
            name: name.into(),
            kind: RepositoryKind::Group(GroupFacet::new(members)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RepositoryKind {
        &self.kind
    }

    /// Returns the group facet, or None for a hosted repository
    pub fn group_facet(&self) -> Option<&GroupFacet> {
        match &self.kind {
            RepositoryKind::Group(facet) => Some(facet),
            RepositoryKind::Hosted => None,
        }
    }

    pub fn is_group(&self) -> bool {
        self.group_facet().is_some()
    }
}

/// Repositories already dispatched to earlier in the call chain.
///
/// Passed by value down through nested groups. Each branch of the fan-out
/// sees its ancestors and their siblings, never what a sibling group queried
/// underneath, so the set bounds recursion rather than deduplicating the
/// whole request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchedRepositories {
    names: HashSet<RepositoryName>,
}

impl DispatchedRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Records a repository as dispatched. Returns false if it already was.
    pub fn add(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

}

/// The inbound read request, passed through to every member unchanged.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestContext {
    /// Builds a GET context for the given path
    pub fn get(uri: Uri) -> Self {
        Self {
            method: Method::GET,
            uri,
            headers: HeaderMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}
