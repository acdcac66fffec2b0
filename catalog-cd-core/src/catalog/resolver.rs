//! Resolving external repositories into a catalog index

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::{normalize_version, Catalog, Release};
use crate::contract::Contract;
use crate::externals::ExternalConfig;
use crate::github::ReleaseLister;
use crate::transport::Transport;

/// Build the catalog index for every configured repository
///
/// Releases whose raw tag is listed in `ignore-versions` are dropped before
/// their contract is fetched. Any listing, download or parse failure aborts
/// the whole resolution: a partially resolved catalog is never returned.
pub async fn resolve(
    config: &ExternalConfig,
    lister: &dyn ReleaseLister,
    transport: &dyn Transport,
) -> Result<Catalog> {
    let mut catalog = Catalog::new();

    for repository in &config.repositories {
        let name = repository.display_name();
        info!("Resolving releases of {} ({})", name, repository.url);

        // Register the repository even when it has no usable release
        catalog.repositories.entry(name.clone()).or_default();

        let tags = lister
            .list_releases(&repository.url)
            .await
            .with_context(|| format!("Failed to list releases of {}", repository.url))?;

        for tag in tags {
            if repository.is_ignored(&tag) {
                debug!("Ignoring {} {}", name, tag);
                continue;
            }

            let contract_url = repository.contract_url(&tag);
            let contract = Contract::from_url(&contract_url, transport)
                .await
                .with_context(|| format!("Failed to load contract of {name} {tag}"))?;

            let release = Release {
                resources_uri: repository.resources_url(&tag),
                contract,
            };

            debug!("Resolved {} {} -> {}", name, tag, release.resources_uri);
            catalog.insert(&name, normalize_version(&tag), release);
        }
    }

    Ok(catalog)
}
