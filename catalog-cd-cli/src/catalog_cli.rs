//! catalog-cd catalog commands
//!
//! Generates a file-based Tekton catalog from the releases of external
//! repositories and emits the GitHub Actions matrix used to do it in parallel.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use catalog_cd_core::catalog::{self, SyncReport};
use catalog_cd_core::contract::{self, ResourceFilter, ResourceKind};
use catalog_cd_core::externals::{ExternalConfig, ExternalRepository};
use catalog_cd_core::github::GitHubReleases;
use catalog_cd_core::transport::HttpTransport;

/// Catalog subcommand for generating file-based catalogs
#[derive(Parser, Debug)]
pub struct CatalogCommand {
    #[clap(subcommand)]
    pub command: CatalogSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CatalogSubcommand {
    /// Generate a file-based catalog in the target folder from a configuration file
    Generate {
        /// Path of the external repositories configuration
        #[clap(long, default_value = "./externals.yaml")]
        config: PathBuf,

        /// Folder to generate the catalog in
        target: PathBuf,
    },

    /// Generate a partial catalog from a single repository
    GenerateFrom {
        /// Name of the repository (defaults to the last URL segment)
        #[clap(long)]
        name: Option<String>,

        /// URL of the repository to pull
        #[clap(long)]
        url: String,

        /// Type of resource to pull (tasks, pipelines, stepactions)
        #[clap(long = "type")]
        resource_type: String,

        /// Release tags to ignore, comma separated
        #[clap(long, value_delimiter = ',')]
        ignore_versions: Vec<String>,

        /// Contract file name attached to each release
        #[clap(long, default_value = contract::FILENAME)]
        catalog_name: String,

        /// Resources tarball name attached to each release
        #[clap(long, default_value = contract::RESOURCES_NAME)]
        resources_tarball_name: String,

        /// Folder to generate the catalog in
        target: PathBuf,
    },

    /// Print a GitHub matrix strategy compatible JSON from a configuration file
    Externals {
        /// Path of the external repositories configuration
        #[clap(long, default_value = "./externals.yaml")]
        config: PathBuf,
    },
}

impl CatalogCommand {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            CatalogSubcommand::Generate { config, target } => {
                execute_generate(&config, &target).await
            }
            CatalogSubcommand::GenerateFrom {
                name,
                url,
                resource_type,
                ignore_versions,
                catalog_name,
                resources_tarball_name,
                target,
            } => {
                let kind: ResourceKind = resource_type.parse()?;

                let mut repository = ExternalRepository::new(url);
                repository.name = name;
                repository.ignore_versions = ignore_versions
                    .into_iter()
                    .filter(|v| !v.is_empty())
                    .collect();
                repository.catalog_name = catalog_name;
                repository.resources_tarball_name = resources_tarball_name;
                repository.apply_defaults();

                let config = ExternalConfig {
                    repositories: vec![repository],
                };

                info!(
                    "Generating a partial catalog from {} (type: {})",
                    config.repositories[0].url, kind
                );
                generate(&config, &target, ResourceFilter::Only(kind)).await
            }
            CatalogSubcommand::Externals { config } => execute_externals(&config),
        }
    }
}

async fn execute_generate(config_path: &Path, target: &Path) -> Result<()> {
    let config = ExternalConfig::load(config_path)?;
    info!(
        "Generating a catalog from {} in {}",
        config_path.display(),
        target.display()
    );
    generate(&config, target, ResourceFilter::All).await
}

async fn generate(config: &ExternalConfig, target: &Path, filter: ResourceFilter) -> Result<()> {
    let lister = GitHubReleases::new()?;
    let transport = HttpTransport::new()?;

    let resolved = catalog::resolve(config, &lister, &transport)
        .await
        .context("Failed to resolve external repositories")?;
    info!(
        "Resolved {} release(s) from {} repository(ies)",
        resolved.release_count(),
        resolved.repository_count()
    );

    let report = catalog::synchronize(target, &resolved, filter, &transport).await?;
    log_report(&report);

    Ok(())
}

fn log_report(report: &SyncReport) {
    info!(
        "Synchronized {} release(s), {} file(s) written",
        report.synchronized.len(),
        report.written.len()
    );

    if !report.is_success() {
        warn!("{} release(s) skipped:", report.failures.len());
        for failure in &report.failures {
            warn!(
                "  {} {} ({})",
                failure.repository, failure.version, failure.resources_uri
            );
        }
    }
}

fn execute_externals(config_path: &Path) -> Result<()> {
    let config = ExternalConfig::load(config_path)?;
    let matrix = config.matrix();
    println!("{}", serde_json::to_string(&matrix)?);
    Ok(())
}
