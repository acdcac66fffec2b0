//! Adding local Tekton resource files to a contract

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use super::{Contract, ResourceKind, TektonResource};
use crate::error::CatalogError;

/// The identifying fields of a Tekton resource document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHeader {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: ResourceMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub name: String,
}

/// Read a resource file and work out which kind of Tekton resource it is
///
/// Files that are not YAML documents with a `kind` are `InvalidResource`,
/// documents with a kind the catalog does not carry are `UnsupportedResource`.
pub fn detect_kind(path: &Path) -> Result<(ResourceKind, ResourceHeader)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read resource file: {}", path.display()))?;

    let header: ResourceHeader =
        serde_yaml_ng::from_str(&content).map_err(|e| CatalogError::InvalidResource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if header.kind.is_empty() {
        return Err(CatalogError::InvalidResource {
            path: path.to_path_buf(),
            reason: "missing 'kind'".to_string(),
        }
        .into());
    }

    let kind =
        ResourceKind::from_kind_name(&header.kind).ok_or_else(|| CatalogError::UnsupportedResource {
            path: path.to_path_buf(),
            kind: header.kind.clone(),
        })?;

    Ok((kind, header))
}

impl Contract {
    /// Add a local resource file to the contract inventory
    ///
    /// The resource is recorded under `<kind>s/<dir>/<file>`, where `<dir>`
    /// is the name of the directory holding the file, which is the layout the
    /// release tarball uses.
    pub fn add_resource_file(&mut self, path: &Path, version: &str) -> Result<TektonResource> {
        let (kind, header) = detect_kind(path)?;

        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read resource file: {}", path.display()))?;
        let checksum = hex::encode(Sha256::digest(&content));

        let dir_name = resource_dir_name(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid resource file name: {}", path.display()))?;

        let name = if header.metadata.name.is_empty() {
            dir_name.clone()
        } else {
            header.metadata.name.clone()
        };

        let resource = TektonResource {
            name,
            version: version.to_string(),
            filename: format!("{}/{}/{}", kind.plural(), dir_name, file_name),
            checksum,
            signature: None,
        };

        let list = self.catalog.resources.list_mut(kind);
        list.retain(|r| r.filename != resource.filename);
        list.push(resource.clone());

        Ok(resource)
    }
}

/// Name of the directory holding a resource file
pub(crate) fn resource_dir_name(path: &Path) -> Result<String> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());

    let parent = if parent.file_name().is_none() {
        parent
            .canonicalize()
            .with_context(|| format!("Failed to resolve directory of {}", path.display()))?
    } else {
        parent
    };

    parent
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Cannot determine resource directory for {}", path.display()))
}
