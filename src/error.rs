use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for update-docker-tags operations
#[derive(Error, Debug)]
pub enum UpdateTagsError {
    #[error("Invalid constraint '{constraint}': {message}")]
    Constraint { constraint: String, message: String },

    #[error("Invalid reference pattern: {0}")]
    Pattern(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry lookup failed for '{repository}': {message}")]
    Registry { repository: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(
        "no semver tags found for '{repository}'{}",
        .constraint.as_ref().map(|c| format!(" matching constraints '{}'", c)).unwrap_or_default()
    )]
    NoMatchingVersion {
        repository: String,
        constraint: Option<String>,
    },

    #[error("when updating '{repository}:{tag}': {source}")]
    Reference {
        repository: String,
        tag: String,
        #[source]
        source: Box<UpdateTagsError>,
    },

    #[error("when replacing image tags in '{}': {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<UpdateTagsError>,
    },

    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory traversal failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Convenience type alias for Results in update-docker-tags
pub type Result<T> = std::result::Result<T, UpdateTagsError>;

impl UpdateTagsError {
    /// Create a constraint parse error
    pub fn constraint(constraint: impl Into<String>, msg: impl Into<String>) -> Self {
        UpdateTagsError::Constraint {
            constraint: constraint.into(),
            message: msg.into(),
        }
    }

    /// Create a pattern error with context
    pub fn pattern(msg: impl Into<String>) -> Self {
        UpdateTagsError::Pattern(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        UpdateTagsError::Config(msg.into())
    }

    /// Create a registry lookup error for a repository
    pub fn registry(repository: impl Into<String>, msg: impl Into<String>) -> Self {
        UpdateTagsError::Registry {
            repository: repository.into(),
            message: msg.into(),
        }
    }

    /// Create an I/O error tied to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdateTagsError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with the reference it occurred on
    pub fn in_reference(self, repository: impl Into<String>, tag: impl Into<String>) -> Self {
        UpdateTagsError::Reference {
            repository: repository.into(),
            tag: tag.into(),
            source: Box::new(self),
        }
    }

    /// Wrap an error with the file it occurred in
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        UpdateTagsError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
