//! Building a release from local Tekton resource files
//!
//! The inverse of synchronization: resource files are copied into the
//! `<kind>s/<name>/` layout under the output directory, a contract listing
//! their checksums is written next to them and the layout is packed into the
//! resources tarball. The contract itself stays out of the tarball.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::README;
use crate::contract::{self, Contract, ResourceKind};
use crate::error::CatalogError;

/// Options for a release build
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    /// Version recorded on every resource
    pub version: String,

    /// Directory receiving the contract, the tarball and the copied resources
    pub output: PathBuf,

    /// File name of the contract
    pub catalog_name: String,

    /// File name of the resources tarball
    pub resources_name: String,
}

impl ReleaseOptions {
    pub fn new(version: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            output: output.into(),
            catalog_name: contract::FILENAME.to_string(),
            resources_name: contract::RESOURCES_NAME.to_string(),
        }
    }

    pub fn contract_path(&self) -> PathBuf {
        self.output.join(&self.catalog_name)
    }

    pub fn tarball_path(&self) -> PathBuf {
        self.output.join(&self.resources_name)
    }
}

/// What a release build produced
#[derive(Debug)]
pub struct ReleaseArtifacts {
    pub contract: Contract,
    pub contract_path: PathBuf,
    pub tarball_path: PathBuf,
}

/// Resource files under `path`
///
/// A file is returned as is. A directory is walked recursively for `.yaml`
/// and `.yml` files, in sorted order.
pub fn scan_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;

    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan {}", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_yaml = matches!(
            entry.path().extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Build the contract and tarball for the resources found under `paths`
///
/// Files declaring an unsupported kind abort the build. Files that cannot be
/// read as a Tekton resource at all are skipped with a warning.
pub fn build_release(paths: &[PathBuf], options: &ReleaseOptions) -> Result<ReleaseArtifacts> {
    if paths.is_empty() {
        anyhow::bail!("no tekton resource paths have been found");
    }

    std::fs::create_dir_all(&options.output).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            options.output.display()
        )
    })?;

    let mut contract = Contract::empty();
    info!("Found {} path(s) to inspect", paths.len());

    for path in paths {
        for file in scan_paths(path)? {
            debug!("Loading resource file {}", file.display());

            let resource = match contract.add_resource_file(&file, &options.version) {
                Ok(resource) => resource,
                Err(e) => {
                    if let Some(CatalogError::UnsupportedResource { .. }) =
                        e.downcast_ref::<CatalogError>()
                    {
                        return Err(e);
                    }
                    warn!("Skipping file {}: {:#}", file.display(), e);
                    continue;
                }
            };

            let target = options.output.join(&resource.filename);
            copy_file(&file, &target)?;

            let readme = file.with_file_name(README);
            if readme.is_file() {
                if let Some(dir) = target.parent() {
                    copy_file(&readme, &dir.join(README))?;
                }
            }

            info!("Added {} {}", resource.filename, resource.version);
        }
    }

    let contract_path = options.contract_path();
    info!("Saving release contract at {}", contract_path.display());
    contract.save_as(&contract_path)?;

    let tarball_path = options.tarball_path();
    info!("Creating tarball at {}", tarball_path.display());
    create_archive(&options.output, &tarball_path)?;

    Ok(ReleaseArtifacts {
        contract,
        contract_path,
        tarball_path,
    })
}

/// Pack the `<kind>s/` directories of `root` into a gzip tarball
///
/// Entry names are relative to `root` and always use `/`.
pub fn create_archive(root: &Path, tarball: &Path) -> Result<()> {
    let file = File::create(tarball)
        .with_context(|| format!("Failed to create {}", tarball.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for kind in ResourceKind::ALL {
        let dir = root.join(kind.plural());
        if !dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = archive_name(root, entry.path())?;
            debug!("Adding {} to {}", name, tarball.display());
            builder
                .append_path_with_name(entry.path(), &name)
                .with_context(|| format!("Failed to add {name} to tarball"))?;
        }
    }

    let encoder = builder.into_inner().context("Failed to finalize tarball")?;
    encoder.finish().context("Failed to compress tarball")?;

    Ok(())
}

fn archive_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // Releasing from inside the output layout
    if let (Ok(a), Ok(b)) = (source.canonicalize(), target.canonicalize()) {
        if a == b {
            return Ok(());
        }
    }

    std::fs::copy(source, target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;

    Ok(())
}
