//! Fetching, extracting and validating release tarballs
//!
//! Each release tarball is decoded entry by entry. Files declared in the
//! release contract are written to `<target>/<dir>/<version>/<file>` while
//! their SHA-256 is computed on the fly, README files are copied through and
//! everything else is skipped.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{annotate, Catalog, Release};
use crate::contract::{ResourceFilter, TektonResource};
use crate::error::CatalogError;
use crate::transport::Transport;

/// Companion documentation file copied without a checksum
pub const README: &str = "README.md";

/// Outcome of a synchronization run
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Releases extracted successfully, as `(repository, version)`
    pub synchronized: Vec<(String, String)>,

    /// Releases that were skipped
    pub failures: Vec<SyncFailure>,

    /// Every file written during the run, including those of failed releases
    pub written: Vec<PathBuf>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A release that could not be synchronized
#[derive(Debug)]
pub struct SyncFailure {
    pub repository: String,
    pub version: String,
    pub resources_uri: String,
    pub error: anyhow::Error,

    /// Files left on disk before the release was rejected
    pub written: Vec<PathBuf>,
}

impl SyncFailure {
    /// Whether the release was rejected because a file failed its checksum
    pub fn is_integrity_violation(&self) -> bool {
        self.error
            .downcast_ref::<CatalogError>()
            .map(CatalogError::is_integrity_violation)
            .unwrap_or(false)
    }
}

/// Files written and skipped while extracting one release
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtractSummary {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

/// Reader that hashes everything read through it
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Hex encoded SHA-256 of the bytes read so far
    pub fn hex_digest(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Extract every release of the catalog into `destination`
///
/// A release that fails to download, decode or validate is logged and
/// recorded in the report; the run carries on with the next release. Only a
/// destination that cannot be created fails the whole run.
pub async fn synchronize(
    destination: &Path,
    catalog: &Catalog,
    filter: ResourceFilter,
    transport: &dyn Transport,
) -> Result<SyncReport> {
    std::fs::create_dir_all(destination).with_context(|| {
        format!(
            "Failed to create catalog directory: {}",
            destination.display()
        )
    })?;

    let mut report = SyncReport::default();

    for (name, repository) in &catalog.repositories {
        info!("Fetching resources from {}", name);

        for (version, release) in repository {
            info!("Fetching version {} of {}", version, name);

            let mut summary = ExtractSummary::default();
            let result =
                fetch_into(destination, version, release, filter, transport, &mut summary).await;
            report.written.extend(summary.written.iter().cloned());

            match result {
                Ok(()) => {
                    report.synchronized.push((name.clone(), version.clone()));
                }
                Err(e) => {
                    let failure = SyncFailure {
                        repository: name.clone(),
                        version: version.clone(),
                        resources_uri: release.resources_uri.clone(),
                        error: e,
                        written: summary.written,
                    };

                    if failure.is_integrity_violation() {
                        error!(
                            "Rejected {} {} from {}: {:#}",
                            name, version, failure.resources_uri, failure.error
                        );
                    } else {
                        warn!(
                            "Failed to fetch resource {}: {:#}, skipping",
                            failure.resources_uri, failure.error
                        );
                    }

                    report.failures.push(failure);
                }
            }
        }
    }

    Ok(report)
}

/// Download one release tarball and extract it
pub async fn fetch_and_extract(
    destination: &Path,
    version: &str,
    release: &Release,
    filter: ResourceFilter,
    transport: &dyn Transport,
) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();
    fetch_into(destination, version, release, filter, transport, &mut summary).await?;
    Ok(summary)
}

/// Download and extract, recording written files in `summary` even on failure
///
/// Decoding runs on the blocking pool so a large tarball does not stall the
/// runtime.
async fn fetch_into(
    destination: &Path,
    version: &str,
    release: &Release,
    filter: ResourceFilter,
    transport: &dyn Transport,
    summary: &mut ExtractSummary,
) -> Result<()> {
    let body = transport
        .fetch(&release.resources_uri)
        .await
        .with_context(|| format!("Failed to download {}", release.resources_uri))?;

    let destination = destination.to_path_buf();
    let version = version.to_string();
    let resources = release.contract.catalog.resources.clone();
    let resources_uri = release.resources_uri.clone();
    let mut partial = std::mem::take(summary);

    let (partial, result) = tokio::task::spawn_blocking(move || {
        let index = resources.index(filter);
        let result = extract_entries(
            Cursor::new(body),
            &destination,
            &version,
            &index,
            &resources_uri,
            &mut partial,
        );
        (partial, result)
    })
    .await
    .context("Extraction task failed")?;

    *summary = partial;
    result
}

/// Decode a gzip tarball and lay out the accepted files under `destination`
///
/// `index` maps archive paths to the resource they must match. Declared files
/// are checksummed while they are written; a mismatch aborts the extraction
/// and leaves the files written so far in place.
pub fn extract_release<R: Read>(
    reader: R,
    destination: &Path,
    version: &str,
    index: &HashMap<&str, &TektonResource>,
    resources_uri: &str,
) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();
    extract_entries(reader, destination, version, index, resources_uri, &mut summary)?;
    Ok(summary)
}

fn extract_entries<R: Read>(
    reader: R,
    destination: &Path,
    version: &str,
    index: &HashMap<&str, &TektonResource>,
    resources_uri: &str,
    summary: &mut ExtractSummary,
) -> Result<()> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(reader));

    for entry in archive.entries().context("Failed to read tarball")? {
        let mut entry = entry.context("Failed to read tarball entry")?;
        let entry_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let entry_path = safe_entry_path(&entry_name)?;

        let filename = match entry_path.file_name() {
            Some(f) => f.to_string_lossy().into_owned(),
            None => continue,
        };
        let is_readme = filename == README;

        let resource = index.get(entry_name.as_str()).copied();
        if resource.is_none() && !is_readme {
            debug!("Ignoring {} (file not present in the catalog file)", entry_name);
            summary.skipped.push(entry_name);
            continue;
        }

        let target_dir = destination
            .join(entry_path.parent().unwrap_or_else(|| Path::new("")))
            .join(version);
        let target = target_dir.join(&filename);

        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }
        if !entry_type.is_file() {
            debug!("Ignoring {} (not a regular file)", entry_name);
            summary.skipped.push(entry_name);
            continue;
        }

        let mut hashing = HashingReader::new(&mut entry);
        let file = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let mut writer = io::BufWriter::new(file);
        io::copy(&mut hashing, &mut writer)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        // Close now rather than at the end of the loop
        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Failed to flush {}", target.display()))?;
        drop(file);
        let actual = hashing.hex_digest();

        summary.written.push(target.clone());

        if let Some(resource) = resource.filter(|_| !is_readme) {
            if !resource.checksum.eq_ignore_ascii_case(&actual) {
                return Err(CatalogError::ChecksumMismatch {
                    filename: resource.filename.clone(),
                    expected: resource.checksum.clone(),
                    actual,
                }
                .into());
            }
            info!("Validated {}", resource.filename);
        }

        if is_manifest(&target) {
            if let Err(e) = annotate(&target, resources_uri) {
                warn!("Failed to annotate {}: {:#}", target.display(), e);
            }
        }
    }

    Ok(())
}

/// Archive entry path, rejecting anything that could escape the destination
fn safe_entry_path(name: &str) -> Result<PathBuf> {
    let path = PathBuf::from(name);
    let safe = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

    if !safe || name.is_empty() {
        return Err(CatalogError::UnsafeEntry(name.to_string()).into());
    }

    Ok(path)
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
