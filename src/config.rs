//! Configuration management for AWS Voyager.
//!
//! This module handles loading and managing application configuration from a TOML file
//! located at `~/.aws-voyager/config.toml`. Configuration includes AWS settings,
//! application behavior, UI preferences, log tailing limits and the GitHub and
//! Lambda deployment integrations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the S3 bucket that holds Lambda deployment artifacts.
pub const DEPLOY_BUCKET_ENV: &str = "S3_DEPLOYMENT_BUCKET_NAME";

/// Main configuration structure for AWS Voyager.
///
/// All configuration options are optional and will fall back to sensible defaults
/// if not specified in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// AWS-specific configuration options
    #[serde(default)]
    pub aws: AwsConfig,

    /// Application behavior configuration
    #[serde(default)]
    pub behavior: BehaviorConfig,

    /// UI and display configuration
    #[serde(default)]
    pub ui: UiConfig,

    /// Log tail configuration
    #[serde(default)]
    pub logs: LogsConfig,

    /// GitHub integration for ECS service deployments
    #[serde(default)]
    pub github: GithubConfig,

    /// Lambda deployment artifacts
    #[serde(default)]
    pub deploy: DeployConfig,
}

/// AWS SDK configuration options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AwsConfig {
    /// Default AWS region (e.g., "eu-west-1")
    /// If not specified, will use AWS SDK's default resolution (env vars, profile, etc.)
    pub region: Option<String>,

    /// AWS profile name to use from ~/.aws/credentials
    pub profile: Option<String>,

    /// ECS cluster to show. The first cluster of the account is used when unset.
    pub cluster: Option<String>,
}

/// Application behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Whether to automatically refresh data periodically
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,

    /// Interval in seconds between automatic refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Page to show on startup: "services", "functions" or "apis"
    #[serde(default = "default_view")]
    pub default_view: String,
}

/// UI configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Color theme: "dark" or "light"
    #[serde(default = "default_theme")]
    pub theme: String,
}

/// Log tail configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Lines kept per log stream before the oldest are dropped
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Minutes of history loaded when a stream is opened
    #[serde(default = "default_backfill_minutes")]
    pub backfill_minutes: i64,

    /// Number of most recently written streams looked at per log group
    #[serde(default = "default_stream_limit")]
    pub stream_limit: i32,
}

/// GitHub configuration for container deployments.
///
/// Packages are read from `ghcr.io/{org}/{package_prefix}{service}`, commits from
/// `{org}/{commit_repo_prefix}{service}`, and deploys dispatch `workflow` in
/// `{org}/{deploy_repo}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub deploy_repo: String,

    #[serde(default = "default_workflow")]
    pub workflow: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub package_prefix: String,

    #[serde(default)]
    pub commit_repo_prefix: String,
}

/// Lambda deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeployConfig {
    /// Bucket holding `{function}/{version}` artifacts
    pub bucket: Option<String>,
}

// Default value functions for serde
fn default_auto_refresh() -> bool {
    false
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_view() -> String {
    "services".to_string()
}

fn default_theme() -> String {
    "dark".to_string()
}

fn default_max_lines() -> usize {
    400
}

fn default_backfill_minutes() -> i64 {
    5
}

fn default_stream_limit() -> i32 {
    10
}

fn default_workflow() -> String {
    "update_container_image_version.yml".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            auto_refresh: default_auto_refresh(),
            refresh_interval: default_refresh_interval(),
            default_view: default_view(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            backfill_minutes: default_backfill_minutes(),
            stream_limit: default_stream_limit(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            org: String::new(),
            deploy_repo: String::new(),
            workflow: default_workflow(),
            branch: default_branch(),
            package_prefix: String::new(),
            commit_repo_prefix: String::new(),
        }
    }
}

impl GithubConfig {
    /// GitHub features are only enabled once an organisation is configured.
    pub fn is_configured(&self) -> bool {
        !self.org.trim().is_empty()
    }
}

impl DeployConfig {
    /// Resolves the deployment bucket, preferring the environment variable.
    pub fn resolve_bucket(&self) -> Option<String> {
        resolve_bucket(std::env::var(DEPLOY_BUCKET_ENV).ok(), self.bucket.clone())
    }
}

fn resolve_bucket(from_env: Option<String>, from_config: Option<String>) -> Option<String> {
    from_env
        .filter(|b| !b.trim().is_empty())
        .or(from_config)
        .filter(|b| !b.trim().is_empty())
}

impl Config {
    /// Returns the path to the configuration directory (~/.aws-voyager/)
    pub fn config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home_dir.join(".aws-voyager"))
    }

    /// Returns the path to the configuration file (~/.aws-voyager/config.toml)
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Loads configuration from the config file, creating a default if it doesn't exist.
    ///
    /// # Errors
    /// This function will return an error if:
    /// - Home directory cannot be determined
    /// - File I/O operations fail
    /// - TOML parsing fails
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Loads configuration from `path`, writing the commented default file there
    /// first if nothing exists yet.
    ///
    /// # Errors
    /// Fails when the file cannot be read, written or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path:?}"))?;

            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {path:?}"))?;

            Ok(config)
        } else {
            Self::create_default_config(path)?;
            Ok(Config::default())
        }
    }

    /// Writes the default configuration file with comments to `path`.
    ///
    /// The parent directory is created if it doesn't exist.
    ///
    /// # Errors
    /// This function will return an error if:
    /// - Directory creation fails
    /// - File write operations fail
    pub fn create_default_config(path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir).with_context(|| {
                    format!("Failed to create config directory: {config_dir:?}")
                })?;
            }
        }

        fs::write(path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        Ok(())
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# AWS Voyager Configuration File
# This file is automatically generated with default values.
# You can edit this file to customize AWS Voyager's behavior.

[aws]
# Default AWS region to use (optional)
# If not specified, uses AWS SDK's default resolution (env vars, ~/.aws/config, etc.)
# region = "eu-west-1"

# AWS profile to use from ~/.aws/credentials (optional)
# profile = "default"

# ECS cluster to show (optional, defaults to the first cluster of the account)
# cluster = "production"

[behavior]
# Enable automatic refresh of data
auto_refresh = false

# Interval in seconds between automatic refreshes
refresh_interval = 30

# Page shown on startup
# Options: "services", "functions", "apis"
default_view = "services"

[ui]
# Color theme
# Options: "dark", "light"
theme = "dark"

[logs]
# Lines kept per log stream
max_lines = 400

# Minutes of history loaded when a log stream is opened
backfill_minutes = 5

# Most recently written streams looked at per log group
stream_limit = 10

[github]
# Organisation owning the container packages and repositories.
# GitHub features are disabled while this is empty.
# org = "my-org"

# Repository holding the deploy workflow
# deploy_repo = "infrastructure"
workflow = "update_container_image_version.yml"
branch = "master"

# Package name is {package_prefix}{service}, commit repository is {commit_repo_prefix}{service}
package_prefix = ""
commit_repo_prefix = ""

[deploy]
# S3 bucket with Lambda artifacts stored as {function}/{version}.
# The S3_DEPLOYMENT_BUCKET_NAME environment variable takes precedence.
# bucket = "my-deployment-bucket"
"#;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(!config.behavior.auto_refresh);
        assert_eq!(config.behavior.refresh_interval, 30);
        assert_eq!(config.behavior.default_view, "services");
        assert_eq!(config.ui.theme, "dark");
        assert_eq!(config.logs.max_lines, 400);
        assert_eq!(config.logs.backfill_minutes, 5);
        assert_eq!(config.logs.stream_limit, 10);
        assert_eq!(config.github.branch, "master");
        assert!(!config.github.is_configured());
        assert!(config.aws.region.is_none());
        assert!(config.aws.profile.is_none());
        assert!(config.aws.cluster.is_none());
        assert!(config.deploy.bucket.is_none());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
[aws]
region = "us-west-2"
profile = "production"
cluster = "prod"

[behavior]
auto_refresh = true
refresh_interval = 60
default_view = "functions"

[ui]
theme = "light"

[logs]
max_lines = 1000

[github]
org = "acme"
deploy_repo = "infrastructure"
branch = "main"
package_prefix = "app-"

[deploy]
bucket = "acme-artifacts"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.aws.region, Some("us-west-2".to_string()));
        assert_eq!(config.aws.profile, Some("production".to_string()));
        assert_eq!(config.aws.cluster, Some("prod".to_string()));
        assert!(config.behavior.auto_refresh);
        assert_eq!(config.behavior.refresh_interval, 60);
        assert_eq!(config.behavior.default_view, "functions");
        assert_eq!(config.ui.theme, "light");
        assert_eq!(config.logs.max_lines, 1000);
        assert_eq!(config.logs.backfill_minutes, 5);
        assert!(config.github.is_configured());
        assert_eq!(config.github.branch, "main");
        assert_eq!(config.github.package_prefix, "app-");
        assert_eq!(config.github.workflow, "update_container_image_version.yml");
        assert_eq!(config.deploy.bucket, Some("acme-artifacts".to_string()));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[aws]
region = "eu-west-1"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.aws.region, Some("eu-west-1".to_string()));
        assert_eq!(config.aws.profile, None);
        // Should use defaults for other fields
        assert!(!config.behavior.auto_refresh);
        assert_eq!(config.behavior.refresh_interval, 30);
        assert_eq!(config.logs.max_lines, 400);
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        let defaults = Config::default();
        assert_eq!(config.behavior.default_view, defaults.behavior.default_view);
        assert_eq!(config.logs.max_lines, defaults.logs.max_lines);
        assert_eq!(config.github.workflow, defaults.github.workflow);
        assert!(!config.github.is_configured());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.logs.max_lines, 400);
    }

    #[test]
    fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[aws]\ncluster = \"staging\"\n\n[github]\norg = \"acme\"\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.aws.cluster, Some("staging".to_string()));
        assert_eq!(loaded.github.org, "acme");
        assert_eq!(loaded.logs.max_lines, Config::default().logs.max_lines);
    }

    #[test]
    fn test_resolve_bucket_prefers_env() {
        assert_eq!(
            resolve_bucket(Some("from-env".to_string()), Some("from-config".to_string())),
            Some("from-env".to_string())
        );
        assert_eq!(
            resolve_bucket(None, Some("from-config".to_string())),
            Some("from-config".to_string())
        );
        assert_eq!(
            resolve_bucket(Some(String::new()), Some("from-config".to_string())),
            Some("from-config".to_string())
        );
        assert_eq!(resolve_bucket(None, None), None);
    }
}
