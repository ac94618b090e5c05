//! Merge strategy for Composer repository metadata.
//!
//! Handles both the root `packages.json` and per-package provider documents.
//! Members are visited in declared order (first = highest priority):
//! - `packages`: union by package name, then by version; the earliest member
//!   wins a version present in several members
//! - `providers`: union by provider name; the earliest member wins
//! - any other top-level field is taken from the earliest member carrying it
//!
//! ```json
//! {
//!   "packages": {
//!     "acme/log": {
//!       "1.0.0": {"name": "acme/log", "version": "1.0.0", ...}
//!     }
//!   },
//!   "providers": {
//!     "acme/log": {"sha256": "..."}
//!   },
//!   "providers-url": "/p/%package%$%hash%.json"
//! }
//! ```

use crate::errors::MergeError;
use crate::merge::MergeStrategy;
use crate::payload::{Content, Payload};
use crate::repository::Repository;
use serde_json::{Map, Value as JsonValue};

pub const COMPOSER_CONTENT_TYPE: &str = "application/json";

const PACKAGES: &str = "packages";
const PROVIDERS: &str = "providers";

#[derive(Debug, Default)]
pub struct ComposerJsonMerger;

impl ComposerJsonMerger {
    pub fn new() -> Self {
        Self
    }

    fn parse(
        repository: &Repository,
        payload: &Payload,
    ) -> Result<Map<String, JsonValue>, MergeError> {
        let value: JsonValue =
            serde_json::from_slice(payload.body()).map_err(|source| MergeError::InvalidJson {
                repository: repository.name().to_string(),
                source,
            })?;

        match value {
            JsonValue::Object(object) => Ok(object),
            other => Err(MergeError::UnexpectedShape {
                repository: repository.name().to_string(),
                reason: format!("expected a JSON object, got {}", json_type(&other)),
            }),
        }
    }
}

impl MergeStrategy for ComposerJsonMerger {
    fn name(&self) -> &'static str {
        "composer_json"
    }

    fn merge(
        &self,
        repository: &Repository,
        payloads: &[Payload],
    ) -> Result<Option<Content>, MergeError> {
        let mut packages: Map<String, JsonValue> = Map::new();
        let mut providers: Map<String, JsonValue> = Map::new();
        let mut merged: Map<String, JsonValue> = Map::new();
        let mut has_packages = false;
        let mut has_providers = false;

        for payload in payloads {
            let document = Self::parse(repository, payload)?;

            for (key, value) in document {
                match key.as_str() {
                    PACKAGES => {
                        has_packages = true;
                        merge_packages(repository, &mut packages, value)?;
                    }
                    PROVIDERS => {
                        has_providers = true;
                        let entries = match value {
                            JsonValue::Object(entries) => entries,
                            other => return Err(unexpected(repository, PROVIDERS, &other)),
                        };
                        for (name, entry) in entries {
                            providers.entry(name).or_insert(entry);
                        }
                    }
                    _ => {
                        merged.entry(key).or_insert(value);
                    }
                }
            }
        }

        if has_packages {
            merged.insert(PACKAGES.to_string(), JsonValue::Object(packages));
        }
        if has_providers {
            merged.insert(PROVIDERS.to_string(), JsonValue::Object(providers));
        }

        let body = serde_json::to_vec(&JsonValue::Object(merged))?;
        Ok(Some(
            Content::new(body).with_content_type(COMPOSER_CONTENT_TYPE),
        ))
    }
}

fn merge_packages(
    repository: &Repository,
    packages: &mut Map<String, JsonValue>,
    value: JsonValue,
) -> Result<(), MergeError> {
    let entries = match value {
        JsonValue::Object(entries) => entries,
        // Composer emits an empty array for a repository without inline packages
        JsonValue::Array(items) if items.is_empty() => return Ok(()),
        other => return Err(unexpected(repository, PACKAGES, &other)),
    };

    for (name, versions) in entries {
        let versions = match versions {
            JsonValue::Object(versions) => versions,
            other => {
                return Err(unexpected(repository, &format!("{PACKAGES}.{name}"), &other));
            }
        };

        let existing = packages
            .entry(name)
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if let JsonValue::Object(existing) = existing {
            for (version, metadata) in versions {
                existing.entry(version).or_insert(metadata);
            }
        }
    }

    Ok(())
}

fn unexpected(repository: &Repository, field: &str, value: &JsonValue) -> MergeError {
    MergeError::UnexpectedShape {
        repository: repository.name().to_string(),
        reason: format!("expected `{field}` to be an object, got {}", json_type(value)),
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
