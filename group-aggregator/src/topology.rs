//! Repository topology built from configuration.
//!
//! Group members are resolved to shared `Repository` handles once at startup.
//! The topology is immutable while requests are served.

use crate::config::{Config, RepositoryConfig, RepositoryType, ValidationError};
use crate::repository::Repository;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Repositories {
    /// Repositories in declaration order
    repositories: IndexMap<String, Arc<Repository>>,
}

impl Repositories {
    /// Validates `config` and resolves every group's members
    pub fn from_config(config: &Config) -> Result<Self, ValidationError> {
        config.validate()?;

        let by_name: HashMap<&str, &RepositoryConfig> = config
            .repositories
            .iter()
            .map(|r| (r.name.as_str(), r))
            .collect();

        let mut resolved = HashMap::new();
        let repositories = config
            .repositories
            .iter()
            .map(|r| {
                let repository = resolve(&r.name, &by_name, &mut resolved)?;
                Ok((r.name.clone(), repository))
            })
            .collect::<Result<IndexMap<_, _>, ValidationError>>()?;

        Ok(Self { repositories })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Repository>> {
        self.repositories.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.repositories.keys()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

// Terminates because validation rejects membership cycles
fn resolve(
    name: &str,
    by_name: &HashMap<&str, &RepositoryConfig>,
    resolved: &mut HashMap<String, Arc<Repository>>,
) -> Result<Arc<Repository>, ValidationError> {
    if let Some(repository) = resolved.get(name) {
        return Ok(repository.clone());
    }

    let config = by_name
        .get(name)
        .ok_or_else(|| ValidationError::UnknownMember {
            group: String::new(),
            member: name.to_string(),
        })?;

    let repository = match &config.r#type {
        RepositoryType::Hosted { .. } => Arc::new(Repository::hosted(name)),
        RepositoryType::Group { members } => {
            let members = members
                .iter()
                .map(|member| resolve(member, by_name, resolved))
                .collect::<Result<Vec<_>, _>>()?;
            Arc::new(Repository::group(name, members))
        }
    };

    resolved.insert(name.to_string(), repository.clone());
    Ok(repository)
}
