use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty repository name")]
    EmptyRepositoryName,

    #[error("Duplicate repository name: {0}")]
    DuplicateRepository(String),

    #[error("Group {group} references unknown member {member}")]
    UnknownMember { group: String, member: String },

    #[error("Group {0} lists itself as a member")]
    SelfMember(String),

    #[error("Group {0} has no members")]
    EmptyGroup(String),

    #[error("Membership cycle through group {0}")]
    MembershipCycle(String),

    #[error("Timeouts must be greater than 0")]
    InvalidTimeout,

    #[error("Member timeout exceeds total timeout")]
    MemberTimeoutExceedsTotal,
}

/// Timeouts bounding a member fan-out
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct DispatchTimeouts {
    /// Upper bound for a single member fetch
    #[serde(default = "default_member_timeout_secs")]
    pub member_timeout_secs: u64,
    /// Upper bound for the whole fan-out, after which outstanding members are abandoned
    #[serde(default = "default_total_timeout_secs")]
    pub total_timeout_secs: u64,
}

fn default_member_timeout_secs() -> u64 {
    10
}

fn default_total_timeout_secs() -> u64 {
    30
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        Self {
            member_timeout_secs: default_member_timeout_secs(),
            total_timeout_secs: default_total_timeout_secs(),
        }
    }
}

impl DispatchTimeouts {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.member_timeout_secs == 0 || self.total_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.member_timeout_secs > self.total_timeout_secs {
            return Err(ValidationError::MemberTimeoutExceedsTotal);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum RepositoryType {
    /// Stored on the local filesystem under `path`
    Hosted { path: PathBuf },
    /// Aggregates `members` in the listed order
    Group { members: Vec<String> },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(flatten)]
    pub r#type: RepositoryType,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchTimeouts,
    pub repositories: Vec<RepositoryConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.dispatch.validate()?;

        let mut names = HashSet::new();
        for repository in &self.repositories {
            if repository.name.is_empty() {
                return Err(ValidationError::EmptyRepositoryName);
            }
            if !names.insert(repository.name.as_str()) {
                return Err(ValidationError::DuplicateRepository(
                    repository.name.clone(),
                ));
            }
        }

        let mut groups: HashMap<&str, &[String]> = HashMap::new();
        for repository in &self.repositories {
            let RepositoryType::Group { members } = &repository.r#type else {
                continue;
            };
            if members.is_empty() {
                return Err(ValidationError::EmptyGroup(repository.name.clone()));
            }
            for member in members {
                if member == &repository.name {
                    return Err(ValidationError::SelfMember(repository.name.clone()));
                }
                if !names.contains(member.as_str()) {
                    return Err(ValidationError::UnknownMember {
                        group: repository.name.clone(),
                        member: member.clone(),
                    });
                }
            }
            groups.insert(repository.name.as_str(), members.as_slice());
        }

        // Depth-first walk over group membership; hosted repositories are leaves
        let mut finished = HashSet::new();
        for repository in &self.repositories {
            let mut in_progress = HashSet::new();
            check_cycles(&repository.name, &groups, &mut in_progress, &mut finished)?;
        }

        Ok(())
    }
}

fn check_cycles<'a>(
    name: &'a str,
    groups: &HashMap<&'a str, &'a [String]>,
    in_progress: &mut HashSet<&'a str>,
    finished: &mut HashSet<&'a str>,
) -> Result<(), ValidationError> {
    if finished.contains(name) {
        return Ok(());
    }
    let Some(&members) = groups.get(name) else {
        finished.insert(name);
        return Ok(());
    };
    if !in_progress.insert(name) {
        return Err(ValidationError::MembershipCycle(name.to_string()));
    }
    for member in members {
        check_cycles(member, groups, in_progress, finished)?;
    }
    in_progress.remove(name);
    finished.insert(name);
    Ok(())
}
