//! Listing releases of external repositories
//!
//! The resolver only needs the tags of published releases, obtained through
//! [`ReleaseLister`]. [`GitHubReleases`] implements it against the GitHub REST
//! API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CatalogError;
use crate::transport::USER_AGENT;

/// Default GitHub REST API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Releases returned per page
const PER_PAGE: usize = 100;

/// Lists the release tags of a repository
#[async_trait]
pub trait ReleaseLister: Send + Sync {
    /// Raw release tags (e.g. `v1.2.3`) for the repository at `repository_url`
    async fn list_releases(&self, repository_url: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
}

/// Release lister backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubReleases {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubReleases {
    /// Client for api.github.com, authenticated from `GITHUB_TOKEN` or `GH_TOKEN` when set
    pub fn new() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .ok()
            .filter(|t| !t.is_empty());

        Self::with_api_url(DEFAULT_API_URL, token)
    }

    /// Client for a custom API endpoint (GitHub Enterprise, tests)
    pub fn with_api_url(api_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn fetch_page(&self, slug: &str, page: usize) -> Result<Vec<GitHubRelease>> {
        let url = format!(
            "{}/repos/{}/releases?per_page={}&page={}",
            self.api_url, slug, PER_PAGE, page
        );

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to list releases from {url}"))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(CatalogError::HttpStatus {
                url,
                status: response.status().as_u16(),
            }
            .into());
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        serde_json::from_str(&body).with_context(|| format!("Failed to parse releases from {url}"))
    }
}

#[async_trait]
impl ReleaseLister for GitHubReleases {
    async fn list_releases(&self, repository_url: &str) -> Result<Vec<String>> {
        let slug = repository_slug(repository_url)?;
        let mut tags = Vec::new();

        for page in 1.. {
            let releases = self.fetch_page(&slug, page).await?;
            let count = releases.len();

            tags.extend(
                releases
                    .into_iter()
                    .filter(|r| !r.draft)
                    .map(|r| r.tag_name),
            );

            if count < PER_PAGE {
                break;
            }
        }

        tracing::debug!("Found {} release(s) for {}", tags.len(), slug);
        Ok(tags)
    }
}

/// `owner/repo` from a repository URL such as `https://github.com/owner/repo`
pub fn repository_slug(repository_url: &str) -> Result<String> {
    let without_scheme = repository_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(repository_url);

    let segments: Vec<&str> = without_scheme
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        [_host, owner, repo] => Ok(format!("{owner}/{repo}")),
        _ => anyhow::bail!(
            "Repository URL '{}' must look like https://<host>/<owner>/<repo>",
            repository_url
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_slug() {
        assert_eq!(
            repository_slug("https://github.com/shortbrain/golang-tasks").unwrap(),
            "shortbrain/golang-tasks"
        );
        assert_eq!(
            repository_slug("https://github.com/shortbrain/golang-tasks/").unwrap(),
            "shortbrain/golang-tasks"
        );
        assert_eq!(
            repository_slug("https://github.com/shortbrain/golang-tasks.git").unwrap(),
            "shortbrain/golang-tasks"
        );
        assert!(repository_slug("https://github.com/shortbrain").is_err());
    }

    #[test]
    fn test_release_payload() {
        let body = r#"[
            {"tag_name": "v0.5.0", "draft": false, "name": "0.5.0"},
            {"tag_name": "v0.6.0-rc", "draft": true}
        ]"#;
        let releases: Vec<GitHubRelease> = serde_json::from_str(body).unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].tag_name, "v0.5.0");
        assert!(releases[1].draft);
    }
}
