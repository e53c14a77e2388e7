use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, UpdateTagsError};
use crate::registry::Registry;

/// A registry lookup recorded by [MockRegistry]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    AuthToken {
        repository: String,
    },
    ListTags {
        repository: String,
        token: Option<String>,
    },
    FetchDigest {
        repository: String,
        tag: String,
    },
}

/// Mock registry for testing without network access
pub struct MockRegistry {
    tokens: HashMap<String, String>,
    tags: HashMap<String, Vec<String>>,
    digests: HashMap<(String, String), String>,
    calls: Mutex<Vec<RegistryCall>>,
}

impl MockRegistry {
    /// Create a new empty mock registry
    pub fn new() -> Self {
        MockRegistry {
            tokens: HashMap::new(),
            tags: HashMap::new(),
            digests: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Require a token for a repository
    pub fn add_token(&mut self, repository: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(repository.into(), token.into());
    }

    /// Publish tags for a repository
    pub fn add_tags(&mut self, repository: impl Into<String>, tags: &[&str]) {
        self.tags
            .entry(repository.into())
            .or_default()
            .extend(tags.iter().map(|t| t.to_string()));
    }

    /// Set the digest a tag resolves to
    pub fn add_digest(
        &mut self,
        repository: impl Into<String>,
        tag: impl Into<String>,
        digest: impl Into<String>,
    ) {
        self.digests
            .insert((repository.into(), tag.into()), digest.into());
    }

    /// Every lookup made so far, in order
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of lookups matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&RegistryCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: RegistryCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check_token(&self, repository: &str, token: Option<&str>) -> Result<()> {
        match self.tokens.get(repository) {
            Some(expected) if Some(expected.as_str()) != token => Err(
                UpdateTagsError::registry(repository, "401 Unauthorized"),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for MockRegistry {
    fn auth_token(&self, repository: &str) -> Result<Option<String>> {
        self.record(RegistryCall::AuthToken {
            repository: repository.to_string(),
        });
        Ok(self.tokens.get(repository).cloned())
    }

    fn list_tags(&self, repository: &str, token: Option<&str>) -> Result<Vec<String>> {
        self.record(RegistryCall::ListTags {
            repository: repository.to_string(),
            token: token.map(str::to_string),
        });
        self.check_token(repository, token)?;
        self.tags
            .get(repository)
            .cloned()
            .ok_or_else(|| UpdateTagsError::registry(repository, "404 Not Found"))
    }

    fn fetch_digest(&self, repository: &str, token: Option<&str>, tag: &str) -> Result<String> {
        self.record(RegistryCall::FetchDigest {
            repository: repository.to_string(),
            tag: tag.to_string(),
        });
        self.check_token(repository, token)?;
        self.digests
            .get(&(repository.to_string(), tag.to_string()))
            .cloned()
            .ok_or_else(|| {
                UpdateTagsError::registry(repository, format!("no manifest for tag '{}'", tag))
            })
    }
}
