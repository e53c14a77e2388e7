//! Container registry access
//!
//! The [Registry] trait covers the three lookups needed to refresh an image
//! reference: an auth token, the repository's tag list, and the content
//! digest of a tag. Implementations:
//!
//! - [docker::DockerRegistry]: Docker Registry HTTP API v2 over `reqwest`
//! - [mock::MockRegistry]: in-memory registry for tests

pub mod docker;
pub mod mock;

pub use docker::DockerRegistry;
pub use mock::{MockRegistry, RegistryCall};

use crate::error::Result;

/// Lookups the tag updater performs against a registry
///
/// All calls are blocking. Failures surface as
/// [crate::error::UpdateTagsError] and abort the file being processed.
pub trait Registry: Send + Sync {
    /// Fetch a bearer token for pulling `repository`
    ///
    /// # Returns
    /// * `Ok(Some(token))` - Token to send with subsequent requests
    /// * `Ok(None)` - The registry does not require one
    /// * `Err` - If the token endpoint cannot be reached or rejects the request
    fn auth_token(&self, repository: &str) -> Result<Option<String>>;

    /// List every tag currently published for `repository`
    fn list_tags(&self, repository: &str, token: Option<&str>) -> Result<Vec<String>>;

    /// Fetch the content digest (`sha256:<hex>`) that `tag` points at
    fn fetch_digest(&self, repository: &str, token: Option<&str>, tag: &str) -> Result<String>;
}

impl<R: Registry + ?Sized> Registry for &R {
    fn auth_token(&self, repository: &str) -> Result<Option<String>> {
        (**self).auth_token(repository)
    }

    fn list_tags(&self, repository: &str, token: Option<&str>) -> Result<Vec<String>> {
        (**self).list_tags(repository, token)
    }

    fn fetch_digest(&self, repository: &str, token: Option<&str>, tag: &str) -> Result<String> {
        (**self).fetch_digest(repository, token, tag)
    }
}

/// Docker Hub host names that all refer to the same registry
const DOCKER_HUB_ALIASES: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];

/// Where an image repository lives: registry host plus repository path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    pub host: String,
    pub path: String,
    pub docker_hub: bool,
}

impl ImageLocation {
    /// Split a repository name as written in a reference.
    ///
    /// The first component is a registry host when it contains `.` or `:`,
    /// or is `localhost`. Anything else lives on Docker Hub, where
    /// single-component names belong to the `library/` namespace.
    pub fn parse(repository: &str, docker_hub_host: &str) -> Self {
        let (host, path) = match repository.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first), rest)
            }
            _ => (None, repository),
        };

        match host {
            Some(host) if !DOCKER_HUB_ALIASES.contains(&host) => ImageLocation {
                host: host.to_string(),
                path: path.to_string(),
                docker_hub: false,
            },
            _ => {
                let path = if path.contains('/') {
                    path.to_string()
                } else {
                    format!("library/{}", path)
                };
                ImageLocation {
                    host: docker_hub_host.to_string(),
                    path,
                    docker_hub: true,
                }
            }
        }
    }
}
