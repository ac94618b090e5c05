use crate::composer::COMPOSER_CONTENT_TYPE;
use crate::config::{Config, RepositoryType};
use crate::dispatcher::MemberHandler;
use crate::errors::DispatchError;
use crate::payload::Content;
use crate::repository::{DispatchedRepositories, Repository, RequestContext};
use crate::response::MemberResponse;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Serves hosted repositories from a directory per repository.
///
/// The request path is resolved relative to the repository directory.
/// Missing files answer 404; the file modification time becomes the
/// last-modified attribute.
pub struct FilesystemHandler {
    roots: HashMap<String, PathBuf>,
}

impl FilesystemHandler {
    pub fn new(roots: HashMap<String, PathBuf>) -> Self {
        Self { roots }
    }

    pub fn from_config(config: &Config) -> Self {
        let roots = config
            .repositories
            .iter()
            .filter_map(|r| match &r.r#type {
                RepositoryType::Hosted { path } => Some((r.name.clone(), path.clone())),
                RepositoryType::Group { .. } => None,
            })
            .collect();
        Self::new(roots)
    }

    /// Maps a request path onto the repository directory, refusing anything
    /// that could escape it
    fn resolve_path(root: &Path, request_path: &str) -> Option<PathBuf> {
        let relative = Path::new(request_path.trim_start_matches('/'));
        let is_contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if relative.as_os_str().is_empty() || !is_contained {
            return None;
        }
        Some(root.join(relative))
    }
}

#[async_trait]
impl MemberHandler for FilesystemHandler {
    async fn get(
        &self,
        context: &RequestContext,
        member: &Arc<Repository>,
        _dispatched: &DispatchedRepositories,
    ) -> Result<MemberResponse, DispatchError> {
        let name = member.name();
        let root = self.roots.get(name).ok_or_else(|| {
            DispatchError::MemberFailed(name.to_string(), "no storage configured".to_string())
        })?;

        let Some(path) = Self::resolve_path(root, context.path()) else {
            tracing::debug!(repository = %name, path = %context.path(), "Rejected request path");
            return Ok(MemberResponse::not_found());
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(MemberResponse::not_found()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MemberResponse::not_found()),
            Err(e) => return Err(DispatchError::Io(name.to_string(), e)),
        };

        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| DispatchError::Io(name.to_string(), e))?;

        let mut content = Content::new(body);
        if let Ok(modified) = metadata.modified() {
            content = content.with_last_modified(DateTime::<Utc>::from(modified));
        }
        if path.extension().is_some_and(|ext| ext == "json") {
            content = content.with_content_type(COMPOSER_CONTENT_TYPE);
        }

        Ok(MemberResponse::ok(content))
    }
}
