//! Catalog generation from external repositories
//!
//! # Overview
//!
//! A catalog is generated in three steps:
//! - **Resolve**: list the releases of every configured repository and load
//!   the contract attached to each of them
//! - **Synchronize**: download each release tarball, validate every file
//!   against the contract checksums and lay it out on disk
//! - **Annotate**: stamp extracted manifests with a `tekton.dev/source`
//!   annotation pointing at the repository they came from
//!
//! # Layout
//!
//! ```text
//! externals.yaml
//!     │
//!     ▼
//! Catalog { repository → version → Release }
//!     │
//!     ▼
//! <target>/<kind>s/<name>/<version>/<file>
//! ```

mod annotate;
mod resolver;
mod sync;

use std::collections::BTreeMap;

use crate::contract::Contract;

pub use annotate::{annotate, extract_repository_url, SOURCE_ANNOTATION};
pub use resolver::resolve;
pub use sync::{
    extract_release, fetch_and_extract, synchronize, ExtractSummary, HashingReader, SyncFailure,
    SyncReport, README,
};

/// A release of an external repository
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    /// Download URL of the resources tarball (uses the raw release tag)
    pub resources_uri: String,

    /// Contract published with the release
    pub contract: Contract,
}

/// Releases of a repository keyed by version, without the leading `v`
pub type Repository = BTreeMap<String, Release>;

/// Repositories to generate a catalog from, keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub repositories: BTreeMap<String, Repository>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release, replacing any release with the same version
    pub fn insert(&mut self, repository: &str, version: &str, release: Release) {
        self.repositories
            .entry(repository.to_string())
            .or_default()
            .insert(version.to_string(), release);
    }

    /// A release by repository name and normalized version
    pub fn get(&self, repository: &str, version: &str) -> Option<&Release> {
        self.repositories.get(repository)?.get(version)
    }

    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    pub fn release_count(&self) -> usize {
        self.repositories.values().map(|r| r.len()).sum()
    }
}

/// Catalog key for a release tag (`v1.2.3` → `1.2.3`)
pub fn normalize_version(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}
