use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, LINK};
use serde::Deserialize;

use crate::config::RegistryConfig;
use crate::error::{Result, UpdateTagsError};
use crate::registry::{ImageLocation, Registry};

/// Manifest media types accepted when resolving a digest, most specific
/// last. Multi-arch images answer with their index digest.
const MANIFEST_MEDIA_TYPES: &str = "application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.v2+json, \
application/vnd.oci.image.manifest.v1+json";

const DIGEST_HEADER: &str = "docker-content-digest";

static NEXT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).expect("link header regex is valid")
});

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Registry client speaking the Docker Registry HTTP API v2
///
/// Tokens are only requested for Docker Hub. Other registries are
/// queried anonymously.
pub struct DockerRegistry {
    config: RegistryConfig,
    http: Client,
}

impl DockerRegistry {
    /// Create a client with the configured timeout
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("update-docker-tags/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(DockerRegistry { config, http })
    }

    fn locate(&self, repository: &str) -> ImageLocation {
        ImageLocation::parse(repository, &self.config.docker_hub_host)
    }

    fn origin(&self, location: &ImageLocation) -> String {
        let scheme = if self.config.insecure_hosts.contains(&location.host) {
            "http"
        } else {
            "https"
        };
        format!("{}://{}", scheme, location.host)
    }

    fn authorized(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send a request, turning non-2xx responses into lookup errors
    fn send(repository: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        Err(UpdateTagsError::registry(
            repository,
            format!("{}: {}", status, body.trim()),
        ))
    }
}

impl Registry for DockerRegistry {
    fn auth_token(&self, repository: &str) -> Result<Option<String>> {
        let location = self.locate(repository);
        if !location.docker_hub {
            return Ok(None);
        }

        tracing::debug!(repository, "fetching auth token");
        let scope = format!("repository:{}:pull", location.path);
        let request = self
            .http
            .get(&self.config.auth_url)
            .query(&[("service", "registry.docker.io"), ("scope", scope.as_str())]);

        let response: TokenResponse = Self::send(repository, request)?.json()?;
        match response.token.or(response.access_token) {
            Some(token) => Ok(Some(token)),
            None => Err(UpdateTagsError::registry(
                repository,
                "token endpoint returned no token",
            )),
        }
    }

    fn list_tags(&self, repository: &str, token: Option<&str>) -> Result<Vec<String>> {
        let location = self.locate(repository);
        let origin = self.origin(&location);
        let mut url = format!("{}/v2/{}/tags/list", origin, location.path);
        let mut visited = HashSet::new();
        let mut tags = Vec::new();

        loop {
            visited.insert(url.clone());
            tracing::debug!(repository, %url, "listing tags");
            let request = Self::authorized(self.http.get(&url), token);
            let response = Self::send(repository, request)?;

            let next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| NEXT_LINK.captures(value))
                .map(|caps| caps[1].to_string());

            let page: TagList = response.json()?;
            tags.extend(page.tags.unwrap_or_default());

            let next = next.map(|link| {
                if link.starts_with('/') {
                    format!("{}{}", origin, link)
                } else {
                    link
                }
            });
            match next {
                Some(link) if visited.contains(&link) => {
                    tracing::warn!(repository, %link, "tag list pagination loops, stopping");
                    break;
                }
                Some(link) => url = link,
                None => break,
            }
        }

        tracing::debug!(repository, count = tags.len(), "fetched tags");
        Ok(tags)
    }

    fn fetch_digest(&self, repository: &str, token: Option<&str>, tag: &str) -> Result<String> {
        let location = self.locate(repository);
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.origin(&location),
            location.path,
            tag
        );

        tracing::debug!(repository, tag, %url, "fetching digest");
        let request =
            Self::authorized(self.http.head(&url), token).header(ACCEPT, MANIFEST_MEDIA_TYPES);
        let response = Self::send(repository, request)?;

        response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                UpdateTagsError::registry(
                    repository,
                    format!("manifest for tag '{}' has no {} header", tag, DIGEST_HEADER),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DockerRegistry {
        DockerRegistry::new(RegistryConfig {
            insecure_hosts: vec!["localhost:5000".to_string()],
            ..RegistryConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_origin_uses_https_by_default() {
        let registry = registry();
        let location = registry.locate("quay.io/prometheus/node-exporter");
        assert_eq!(registry.origin(&location), "https://quay.io");
    }

    #[test]
    fn test_origin_for_insecure_host() {
        let registry = registry();
        let location = registry.locate("localhost:5000/app");
        assert_eq!(registry.origin(&location), "http://localhost:5000");
    }

    #[test]
    fn test_docker_hub_origin() {
        let registry = registry();
        let location = registry.locate("alpine");
        assert_eq!(registry.origin(&location), "https://index.docker.io");
        assert_eq!(location.path, "library/alpine");
    }

    #[test]
    fn test_no_token_for_other_registries() {
        let registry = registry();
        assert_eq!(registry.auth_token("quay.io/coreos/etcd").unwrap(), None);
    }

    #[test]
    fn test_next_link_parsing() {
        let header = r#"</v2/library/alpine/tags/list?last=3.10&n=100>; rel="next""#;
        let caps = NEXT_LINK.captures(header).unwrap();
        assert_eq!(&caps[1], "/v2/library/alpine/tags/list?last=3.10&n=100");
    }

    #[test]
    fn test_tag_list_with_null_tags() {
        let list: TagList = serde_json::from_str(r#"{"name":"x","tags":null}"#).unwrap();
        assert!(list.tags.is_none());
    }

    #[test]
    fn test_token_response_variants() {
        let a: TokenResponse = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(a.token.as_deref(), Some("abc"));
        let b: TokenResponse = serde_json::from_str(r#"{"access_token":"xyz"}"#).unwrap();
        assert_eq!(b.token.or(b.access_token).as_deref(), Some("xyz"));
    }
}
