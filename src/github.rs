//! Minimal GitHub REST client for container package versions, commits and
//! workflow dispatches.
//!
//! The token is borrowed from the GitHub CLI (`gh auth token`), so the
//! dashboard never stores credentials of its own.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::config::GithubConfig;

const API_URL: &str = "https://api.github.com";
const REGISTRY: &str = "ghcr.io";
const SHORT_SHA_LEN: usize = 7;

#[derive(Error, Debug)]
pub enum GithubError {
    #[error("GitHub integration is not configured (set github.org in the config file)")]
    NotConfigured,
    #[error("Could not read a GitHub token from `gh auth token`: {0}")]
    Token(String),
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub returned {status} for {url}: {body}")]
    Api { status: u16, url: String, body: String },
}

/// A published container image version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub sha: String,
    pub image: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub message: String,
}

/// A package version that can be rolled out, with the commit it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployable {
    pub created: DateTime<Utc>,
    pub sha: String,
    pub image: String,
    pub commit_message: String,
}

impl Deployable {
    /// The image without the registry and organisation, e.g. `orders:1.2.0-abc1234`.
    pub fn short_image(&self) -> &str {
        self.image.rsplit('/').next().unwrap_or(&self.image)
    }
}

#[derive(Debug, Deserialize)]
struct PackageVersionResponse {
    created_at: DateTime<Utc>,
    metadata: Option<PackageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PackageMetadata {
    container: Option<ContainerMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    commit: Option<CommitDetail>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct WorkflowDispatch<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: WorkflowInputs<'a>,
}

#[derive(Debug, Serialize)]
struct WorkflowInputs<'a> {
    application: &'a str,
    image_version: &'a str,
    environment: &'a str,
}

#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    config: GithubConfig,
}

impl GithubClient {
    /// Creates a client with an explicit token.
    ///
    /// # Errors
    /// Returns [`GithubError::NotConfigured`] when no organisation is set, and
    /// [`GithubError::Token`] when the token is not a valid header value.
    pub fn new(config: GithubConfig, token: &str) -> Result<Self, GithubError> {
        if !config.is_configured() {
            return Err(GithubError::NotConfigured);
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|e| GithubError::Token(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("aws-voyager/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self { client, config })
    }

    /// Creates a client using the token of the logged in GitHub CLI user.
    ///
    /// # Errors
    /// Fails when GitHub is not configured or `gh auth token` fails.
    pub async fn from_gh_cli(config: GithubConfig) -> Result<Self, GithubError> {
        if !config.is_configured() {
            return Err(GithubError::NotConfigured);
        }
        let token = gh_auth_token().await?;
        Self::new(config, &token)
    }

    /// Lists the ten latest versions of a container package, newest first.
    ///
    /// Versions without tags are skipped.
    pub async fn package_versions(&self, name: &str) -> Result<Vec<Package>, GithubError> {
        let url = format!(
            "{API_URL}/orgs/{}/packages/container/{name}/versions?per_page=10",
            self.config.org
        );
        let versions: Vec<PackageVersionResponse> = self.get_json(&url).await?;
        Ok(packages_from_versions(&self.config.org, name, versions))
    }

    /// Lists the latest 20 commits on the configured branch of a repository.
    pub async fn commits(&self, repo: &str) -> Result<Vec<Commit>, GithubError> {
        let url = format!(
            "{API_URL}/repos/{}/{repo}/commits?sha={}&per_page=20",
            self.config.org, self.config.branch
        );
        let commits: Vec<CommitResponse> = self.get_json(&url).await?;

        Ok(commits
            .into_iter()
            .map(|c| Commit {
                sha: c.sha,
                message: c.commit.and_then(|d| d.message).unwrap_or_default(),
            })
            .collect())
    }

    /// Loads the deployables of a service: its package versions joined with
    /// the commits of its application repository.
    pub async fn deployables(&self, service: &str) -> Result<Vec<Deployable>, GithubError> {
        let package = format!("{}{service}", self.config.package_prefix);
        let repo = format!("{}{service}", self.config.commit_repo_prefix);

        let (packages, commits) = tokio::join!(self.package_versions(&package), self.commits(&repo));
        let commits = commits.unwrap_or_else(|e| {
            tracing::error!("Failed to read commits from {}: {}", repo, e);
            Vec::new()
        });

        Ok(join_deployables(packages?, &commits))
    }

    /// Triggers the deploy workflow for a service.
    ///
    /// # Arguments
    /// * `cluster` - Passed as the `environment` input
    /// * `service` - Passed as the `application` input
    /// * `image` - Full image reference, passed as `image_version`
    pub async fn dispatch_workflow(
        &self,
        cluster: &str,
        service: &str,
        image: &str,
    ) -> Result<(), GithubError> {
        let url = format!(
            "{API_URL}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.config.org, self.config.deploy_repo, self.config.workflow
        );
        let body = dispatch_body(&self.config.branch, cluster, service, image);

        tracing::info!("Dispatching {} for {} in {}", self.config.workflow, service, cluster);
        let response = self.client.post(&url).json(&body).send().await?;
        check_status(response, &url).await?;
        Ok(())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, GithubError> {
        let response = self.client.get(url).send().await?;
        let response = check_status(response, url).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response, GithubError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(GithubError::Api {
        status,
        url: url.to_string(),
        body,
    })
}

/// Reads the token of the GitHub CLI.
async fn gh_auth_token() -> Result<String, GithubError> {
    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .await
        .map_err(|e| GithubError::Token(e.to_string()))?;

    if !output.status.success() {
        return Err(GithubError::Token(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let token = String::from_utf8_lossy(&output.stdout).replace('\n', "");
    if token.is_empty() {
        return Err(GithubError::Token("empty token".to_string()));
    }
    Ok(token)
}

fn packages_from_versions(org: &str, name: &str, versions: Vec<PackageVersionResponse>) -> Vec<Package> {
    let mut packages: Vec<Package> = versions
        .into_iter()
        .filter_map(|v| {
            let tag = v.metadata?.container?.tags.into_iter().next()?;
            Some(Package {
                sha: short_sha(&tag).to_string(),
                image: format!("{REGISTRY}/{org}/{name}:{tag}"),
                created: v.created_at,
            })
        })
        .collect();

    packages.sort_by(|a, b| b.created.cmp(&a.created));
    packages
}

/// The last seven characters of a tag, which by convention end with the commit sha.
fn short_sha(tag: &str) -> &str {
    let start = tag
        .char_indices()
        .rev()
        .nth(SHORT_SHA_LEN - 1)
        .map_or(0, |(i, _)| i);
    &tag[start..]
}

/// Pairs each package with the first line of the commit it was built from.
pub fn join_deployables(packages: Vec<Package>, commits: &[Commit]) -> Vec<Deployable> {
    packages
        .into_iter()
        .map(|p| {
            let commit_message = commits
                .iter()
                .find(|c| c.sha.starts_with(&p.sha))
                .and_then(|c| c.message.lines().next())
                .unwrap_or_default()
                .to_string();

            Deployable {
                created: p.created,
                sha: p.sha,
                image: p.image,
                commit_message,
            }
        })
        .collect()
}

fn dispatch_body<'a>(
    branch: &'a str,
    cluster: &'a str,
    service: &'a str,
    image: &'a str,
) -> WorkflowDispatch<'a> {
    WorkflowDispatch {
        git_ref: branch,
        inputs: WorkflowInputs {
            application: service,
            image_version: image,
            environment: cluster,
        },
    }
}
