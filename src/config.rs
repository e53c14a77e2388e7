use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::domain::reference::DEFAULT_PATTERN;
use crate::domain::{ReferencePattern, VersionConstraint};
use crate::driver::UpdateOptions;
use crate::error::{Result, UpdateTagsError};

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "update-docker-tags.toml";

/// Represents the complete configuration for update-docker-tags.
///
/// Holds the reference pattern, per-image version constraints, and registry
/// connection settings. Command-line flags are layered on top with
/// [Config::with_overrides].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Image name -> constraint, applied to images with version tags
    #[serde(default)]
    pub constraints: HashMap<String, String>,

    /// Image name -> constraint, applied even to images with opaque tags
    #[serde(default)]
    pub enforce: HashMap<String, String>,

    #[serde(default)]
    pub registry: RegistryConfig,
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_auth_url() -> String {
    "https://auth.docker.io/token".to_string()
}

fn default_docker_hub_host() -> String {
    "index.docker.io".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Settings for talking to container registries.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Docker Hub token endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Host serving the Docker Hub registry API
    #[serde(default = "default_docker_hub_host")]
    pub docker_hub_host: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Registry hosts reached over plain HTTP
    #[serde(default)]
    pub insecure_hosts: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            auth_url: default_auth_url(),
            docker_hub_host: default_docker_hub_host(),
            timeout_secs: default_timeout_secs(),
            insecure_hosts: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pattern: default_pattern(),
            constraints: HashMap::new(),
            enforce: HashMap::new(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Layer command-line flags over the loaded configuration.
    ///
    /// `constraints` and `enforce` hold raw `IMAGE=CONSTRAINT` arguments;
    /// entries given here replace entries for the same image from the file.
    pub fn with_overrides(
        mut self,
        constraints: &[String],
        enforce: &[String],
        pattern: Option<&str>,
    ) -> Result<Self> {
        for raw in constraints {
            let (image, constraint) = parse_image_constraint(raw)?;
            self.constraints.insert(image, constraint);
        }
        for raw in enforce {
            let (image, constraint) = parse_image_constraint(raw)?;
            self.enforce.insert(image, constraint);
        }
        if let Some(pattern) = pattern {
            self.pattern = pattern.to_string();
        }
        Ok(self)
    }

    /// Compile pattern and constraints into options for the tag updater.
    ///
    /// Every parse error surfaces here, before any file is touched.
    pub fn update_options(&self, dry_run: bool) -> Result<UpdateOptions> {
        Ok(UpdateOptions {
            pattern: ReferencePattern::new(&self.pattern)?,
            constraints: compile_constraints(&self.constraints)?,
            enforce: compile_constraints(&self.enforce)?,
            dry_run,
        })
    }
}

fn compile_constraints(raw: &HashMap<String, String>) -> Result<HashMap<String, VersionConstraint>> {
    raw.iter()
        .map(|(image, constraint)| Ok((image.clone(), VersionConstraint::parse(constraint)?)))
        .collect()
}

/// Split an `IMAGE=CONSTRAINT` argument at its first `=`.
///
/// # Example
/// ```ignore
/// assert_eq!(
///     parse_image_constraint("ubuntu=>=18.04").unwrap(),
///     ("ubuntu".to_string(), ">=18.04".to_string())
/// );
/// ```
pub fn parse_image_constraint(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((image, constraint)) if !image.trim().is_empty() && !constraint.trim().is_empty() => {
            Ok((image.trim().to_string(), constraint.trim().to_string()))
        }
        _ => Err(UpdateTagsError::config(format!(
            "unable to split constraint '{}', expected IMAGE=CONSTRAINT",
            raw
        ))),
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `update-docker-tags.toml` in current directory
/// 3. `~/.config/.update-docker-tags.toml` in user config directory
/// 4. Default configuration if no file found
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If file exists but cannot be read or parsed
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let path = if let Some(path) = config_path {
        Path::new(path).to_path_buf()
    } else if Path::new(CONFIG_FILE_NAME).exists() {
        Path::new(CONFIG_FILE_NAME).to_path_buf()
    } else if let Some(config_dir) = dirs::config_dir() {
        let config_path = config_dir.join(format!(".{}", CONFIG_FILE_NAME));
        if config_path.exists() {
            config_path
        } else {
            return Ok(Config::default());
        }
    } else {
        return Ok(Config::default());
    };

    tracing::debug!(path = %path.display(), "loading configuration");
    let config_str = fs::read_to_string(&path).map_err(|e| UpdateTagsError::io(&path, e))?;
    toml::from_str(&config_str)
        .map_err(|e| UpdateTagsError::config(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_constraint() {
        assert_eq!(
            parse_image_constraint("ubuntu=<18.04").unwrap(),
            ("ubuntu".to_string(), "<18.04".to_string())
        );
    }

    #[test]
    fn test_parse_image_constraint_keeps_later_equals() {
        assert_eq!(
            parse_image_constraint("alpine=>=3.10").unwrap(),
            ("alpine".to_string(), ">=3.10".to_string())
        );
    }

    #[test]
    fn test_parse_image_constraint_invalid() {
        assert!(parse_image_constraint("ubuntu").is_err());
        assert!(parse_image_constraint("=<1.0").is_err());
        assert!(parse_image_constraint("ubuntu=").is_err());
    }

    #[test]
    fn test_overrides_replace_file_entries() {
        let mut config = Config::default();
        config
            .constraints
            .insert("ubuntu".to_string(), "<16.04".to_string());

        let config = config
            .with_overrides(
                &["ubuntu=<18.04".to_string()],
                &["sourcegraph/frontend=~3.19".to_string()],
                None,
            )
            .unwrap();

        assert_eq!(config.constraints.get("ubuntu").unwrap(), "<18.04");
        assert_eq!(config.enforce.get("sourcegraph/frontend").unwrap(), "~3.19");
        assert_eq!(config.pattern, DEFAULT_PATTERN);
    }

    #[test]
    fn test_update_options_rejects_bad_constraint() {
        let config = Config::default()
            .with_overrides(&["ubuntu=latest".to_string()], &[], None)
            .unwrap();
        assert!(config.update_options(false).is_err());
    }

    #[test]
    fn test_update_options_rejects_bad_pattern() {
        let config = Config::default()
            .with_overrides(&[], &[], Some("(only-one-group)"))
            .unwrap();
        assert!(config.update_options(false).is_err());
    }

    #[test]
    fn test_update_options_compiles() {
        let config = Config::default()
            .with_overrides(
                &["ubuntu=<18.04".to_string()],
                &["alpine=~3.10".to_string()],
                None,
            )
            .unwrap();
        let options = config.update_options(true).unwrap();
        assert!(options.dry_run);
        assert_eq!(options.constraints["ubuntu"].as_str(), "<18.04");
        assert_eq!(options.enforce["alpine"].as_str(), "~3.10");
    }
}
