//! External repositories configuration (externals.yaml)
//!
//! Declares the repositories a catalog is generated from:
//!
//! ```yaml
//! repositories:
//!   - name: golang                      # optional, defaults to the last URL segment
//!     url: https://github.com/shortbrain/golang-tasks
//!     types: [tasks]                    # optional, used by the build matrix
//!     ignore-versions: [v0.1.0]
//!     catalog-name: catalog.yaml        # optional
//!     resources-tarball-name: resources.tar.gz  # optional
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::contract::{self, ResourceKind};

/// Configuration for the repositories to pull from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default)]
    pub repositories: Vec<ExternalRepository>,
}

/// A repository publishing catalog releases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalRepository {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub url: String,

    /// Resource types to pull
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<ResourceKind>,

    /// Release tags that must not be part of the catalog
    #[serde(default, rename = "ignore-versions")]
    pub ignore_versions: Vec<String>,

    #[serde(default, rename = "catalog-name")]
    pub catalog_name: String,

    #[serde(default, rename = "resources-tarball-name")]
    pub resources_tarball_name: String,
}

impl ExternalConfig {
    /// Load the configuration from a file and apply defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Could not load external configuration from {}",
                path.display()
            )
        })?;

        Self::from_yaml(&content).with_context(|| {
            format!(
                "Could not load external configuration from {}",
                path.display()
            )
        })
    }

    /// Parse the configuration from YAML and apply defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Self =
            serde_yaml_ng::from_str(content).context("Invalid externals YAML")?;
        config.apply_defaults();
        Ok(config)
    }

    /// Fill in the default contract and tarball names
    pub fn apply_defaults(&mut self) {
        for repository in &mut self.repositories {
            repository.apply_defaults();
        }
    }

    /// GitHub Actions matrix with one job per repository and resource type
    pub fn matrix(&self) -> GitHubMatrix {
        let mut include = Vec::new();

        for repository in &self.repositories {
            let types = if repository.types.is_empty() {
                vec![ResourceKind::Task, ResourceKind::Pipeline]
            } else {
                repository.types.clone()
            };

            for kind in types {
                include.push(MatrixEntry {
                    name: repository.display_name(),
                    url: repository.url.clone(),
                    resource_type: kind.plural().to_string(),
                    ignore_versions: repository.ignore_versions.join(","),
                    catalog_name: repository.catalog_name.clone(),
                    resources_tarball_name: repository.resources_tarball_name.clone(),
                });
            }
        }

        GitHubMatrix { include }
    }
}

impl ExternalRepository {
    /// A repository with default file names
    pub fn new(url: impl Into<String>) -> Self {
        let mut repository = Self {
            url: url.into(),
            ..Default::default()
        };
        repository.apply_defaults();
        repository
    }

    pub fn apply_defaults(&mut self) {
        if self.catalog_name.is_empty() {
            self.catalog_name = contract::FILENAME.to_string();
        }
        if self.resources_tarball_name.is_empty() {
            self.resources_tarball_name = contract::RESOURCES_NAME.to_string();
        }
    }

    /// Explicit name, else the last segment of the URL
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Where the contract of a release is downloaded from
    pub fn contract_url(&self, tag: &str) -> String {
        format!(
            "{}/releases/download/{}/{}",
            self.base_url(),
            tag,
            self.catalog_name
        )
    }

    /// Where the resources tarball of a release is downloaded from
    pub fn resources_url(&self, tag: &str) -> String {
        format!(
            "{}/releases/download/{}/{}",
            self.base_url(),
            tag,
            self.resources_tarball_name
        )
    }

    pub fn is_ignored(&self, tag: &str) -> bool {
        self.ignore_versions.iter().any(|v| v == tag)
    }
}

/// GitHub Actions `strategy.matrix` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitHubMatrix {
    pub include: Vec<MatrixEntry>,
}

/// One job of the GitHub Actions matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(rename = "ignoreVersions")]
    pub ignore_versions: String,
    #[serde(rename = "catalog-name")]
    pub catalog_name: String,
    #[serde(rename = "resources-tarball-name")]
    pub resources_tarball_name: String,
}
