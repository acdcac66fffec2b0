//! Catalog contract (catalog.yaml)
//!
//! The contract is the versioned manifest a repository attaches to each of its
//! releases. It lists every Tekton resource shipped in the release tarball
//! together with the SHA-256 checksum of the file, and optionally a reference
//! to the public key used to sign them.
//!
//! The same document is read when a catalog is generated from external
//! repositories and written when a release is built from local files.

mod resource;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::CatalogError;
use crate::transport::Transport;

pub use resource::{detect_kind, ResourceHeader, ResourceMetadata};

/// Current contract version
pub const VERSION: &str = "v1";

/// Default contract file name
pub const FILENAME: &str = "catalog.yaml";

/// Default resources tarball name
pub const RESOURCES_NAME: &str = "resources.tar.gz";

/// Extension appended to a resource path to name its signature
pub const SIGNATURE_EXTENSION: &str = "sig";

/// The kinds of Tekton resources a catalog carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "tasks")]
    Task,
    #[serde(rename = "pipelines")]
    Pipeline,
    #[serde(rename = "stepactions")]
    StepAction,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Task,
        ResourceKind::Pipeline,
        ResourceKind::StepAction,
    ];

    /// Directory name used inside tarballs and on disk (`tasks`, `pipelines`, `stepactions`)
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Task => "tasks",
            ResourceKind::Pipeline => "pipelines",
            ResourceKind::StepAction => "stepactions",
        }
    }

    /// The `kind:` value used by the Tekton API
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceKind::Task => "Task",
            ResourceKind::Pipeline => "Pipeline",
            ResourceKind::StepAction => "StepAction",
        }
    }

    /// Map a Tekton `kind:` value to a resource kind
    pub fn from_kind_name(kind: &str) -> Option<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.kind_name() == kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

impl FromStr for ResourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.plural() == lower || k.kind_name().to_ascii_lowercase() == lower)
            .with_context(|| {
                format!("Invalid resource type '{s}'. Valid types: tasks, pipelines, stepactions")
            })
    }
}

/// Which resource kinds to extract from a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceFilter {
    /// Tasks, pipelines and stepactions combined
    #[default]
    All,
    Only(ResourceKind),
}

impl ResourceFilter {
    pub fn kinds(&self) -> Vec<ResourceKind> {
        match self {
            ResourceFilter::All => ResourceKind::ALL.to_vec(),
            ResourceFilter::Only(kind) => vec![*kind],
        }
    }
}

impl FromStr for ResourceFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(ResourceFilter::All);
        }
        Ok(ResourceFilter::Only(s.parse()?))
    }
}

impl From<Option<ResourceKind>> for ResourceFilter {
    fn from(kind: Option<ResourceKind>) -> Self {
        kind.map(ResourceFilter::Only).unwrap_or_default()
    }
}

/// General repository information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Long description text
    #[serde(default)]
    pub description: String,
}

/// Software supply chain provenance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    /// Reference to the public key verifying the resource signatures
    #[serde(rename = "publicKeyRef", default)]
    pub public_key_ref: String,
}

/// A single Tekton resource shipped in a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TektonResource {
    /// Resource name
    pub name: String,

    /// Release version the resource belongs to
    pub version: String,

    /// Path inside the release tarball (e.g. `tasks/foo/foo.yaml`)
    pub filename: String,

    /// Hex encoded SHA-256 of the file content
    pub checksum: String,

    /// Signature file, relative to the contract, once the resource is signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Inventory of Tekton resources, one list per kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub tasks: Vec<TektonResource>,

    #[serde(default)]
    pub pipelines: Vec<TektonResource>,

    #[serde(default)]
    pub stepactions: Vec<TektonResource>,
}

impl Resources {
    /// Resources of a single kind
    pub fn list(&self, kind: ResourceKind) -> &[TektonResource] {
        match kind {
            ResourceKind::Task => &self.tasks,
            ResourceKind::Pipeline => &self.pipelines,
            ResourceKind::StepAction => &self.stepactions,
        }
    }

    pub fn list_mut(&mut self, kind: ResourceKind) -> &mut Vec<TektonResource> {
        match kind {
            ResourceKind::Task => &mut self.tasks,
            ResourceKind::Pipeline => &mut self.pipelines,
            ResourceKind::StepAction => &mut self.stepactions,
        }
    }

    /// All resources together with their kind
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &TektonResource)> {
        ResourceKind::ALL
            .into_iter()
            .flat_map(move |kind| self.list(kind).iter().map(move |r| (kind, r)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TektonResource> {
        self.tasks
            .iter_mut()
            .chain(self.pipelines.iter_mut())
            .chain(self.stepactions.iter_mut())
    }

    /// Accepted files for a filter, keyed by their path inside the tarball
    pub fn index(&self, filter: ResourceFilter) -> HashMap<&str, &TektonResource> {
        filter
            .kinds()
            .into_iter()
            .flat_map(|kind| self.list(kind).iter())
            .map(|r| (r.filename.as_str(), r))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len() + self.pipelines.len() + self.stepactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The catalog described by a contract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,

    #[serde(default)]
    pub resources: Resources,
}

/// A versioned catalog contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract version
    pub version: String,

    /// Tekton resources catalog
    pub catalog: ContractCatalog,

    /// Where the contract was loaded from, if it came from disk
    #[serde(skip)]
    file: Option<PathBuf>,
}

impl Default for Contract {
    fn default() -> Self {
        Self::empty()
    }
}

impl Contract {
    /// Create a contract with empty attributes
    pub fn empty() -> Self {
        Self {
            version: VERSION.to_string(),
            catalog: ContractCatalog {
                repository: Some(RepositoryInfo::default()),
                attestation: Some(Attestation::default()),
                resources: Resources::default(),
            },
            file: None,
        }
    }

    /// Parse a contract from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Invalid contract YAML")
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("Failed to serialize contract")
    }

    /// Load a contract from disk
    ///
    /// When `location` is a directory the default contract file name is
    /// appended, otherwise the location is the contract file itself.
    pub fn from_path(location: &Path) -> Result<Self> {
        let file = if location.is_dir() {
            location.join(FILENAME)
        } else {
            location.to_path_buf()
        };

        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read contract: {}", file.display()))?;

        let mut contract = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse contract: {}", file.display()))?;
        contract.file = Some(file);

        Ok(contract)
    }

    /// Download and parse a contract
    pub async fn from_url(url: &str, transport: &dyn Transport) -> Result<Self> {
        let bytes = transport
            .fetch(url)
            .await
            .with_context(|| format!("Could not load contract from {url}"))?;

        let content = String::from_utf8(bytes)
            .with_context(|| format!("Contract at {url} is not valid UTF-8"))?;

        Self::from_yaml(&content).with_context(|| format!("Failed to parse contract from {url}"))
    }

    /// The file this contract was loaded from or last saved to
    pub fn location(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Directory resource filenames are relative to
    pub fn base_dir(&self) -> PathBuf {
        self.file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save the contract back to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        let file = self.file.as_deref().ok_or(CatalogError::ContractLocationUnset)?;
        self.write_to(file)
    }

    /// Save the contract to `path` and remember it as its location
    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        self.write_to(path)?;
        self.file = Some(path.to_path_buf());
        Ok(())
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = self.to_yaml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write contract: {}", path.display()))
    }

    /// The attestation public key reference
    pub fn public_key(&self) -> Result<&str> {
        self.catalog
            .attestation
            .as_ref()
            .map(|a| a.public_key_ref.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CatalogError::MissingPublicKey.into())
    }

    /// Sign every resource in the contract
    ///
    /// `signer` receives the resource payload path and the path the signature
    /// must be written to. The signature filename is recorded on the resource.
    pub fn sign_resources<F>(&mut self, mut signer: F) -> Result<()>
    where
        F: FnMut(&Path, &Path) -> Result<()>,
    {
        let base = self.base_dir();

        for resource in self.catalog.resources.iter_mut() {
            let signature = format!("{}.{}", resource.filename, SIGNATURE_EXTENSION);
            let payload_path = base.join(&resource.filename);
            let signature_path = base.join(&signature);

            signer(&payload_path, &signature_path)
                .with_context(|| format!("Failed to sign {}", resource.filename))?;

            resource.signature = Some(signature);
        }

        Ok(())
    }

    /// Verify every resource against its signature
    ///
    /// Resources without a recorded signature are checked against the
    /// conventional `<filename>.sig` next to them. The first failure aborts.
    pub fn verify_resources<F>(&self, mut verifier: F) -> Result<()>
    where
        F: FnMut(&Path, &Path) -> Result<()>,
    {
        let base = self.base_dir();

        for (_, resource) in self.catalog.resources.iter() {
            let signature = resource
                .signature
                .clone()
                .unwrap_or_else(|| format!("{}.{}", resource.filename, SIGNATURE_EXTENSION));

            verifier(&base.join(&resource.filename), &base.join(&signature))
                .with_context(|| format!("Failed to verify {}", resource.filename))?;
        }

        Ok(())
    }
}
