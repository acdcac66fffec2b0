//! Catalog error types
//!
//! Domain failures that callers need to tell apart. Everything else is
//! propagated as `anyhow::Error` with context attached.

use std::path::PathBuf;
use thiserror::Error;

/// Catalog specific errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A file extracted from a release tarball does not hash to the declared checksum
    #[error("invalid checksum for {filename}: {actual} != {expected}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// A remote endpoint answered with something other than 200 OK
    #[error("status error: HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// A resource file declares a kind the catalog cannot carry
    #[error("unsupported tekton resource kind '{kind}' in {path}")]
    UnsupportedResource { path: PathBuf, kind: String },

    /// A file could not be read as a tekton resource at all
    #[error("{path} is not a tekton resource: {reason}")]
    InvalidResource { path: PathBuf, reason: String },

    /// An archive entry would escape the destination directory
    #[error("refusing to extract unsafe archive entry '{0}'")]
    UnsafeEntry(String),

    /// The contract has no attestation public key reference
    #[error("contract does not declare an attestation public key (catalog.attestation.publicKeyRef)")]
    MissingPublicKey,

    /// The contract was not loaded from disk, so there is nowhere to save it
    #[error("contract file location is not set")]
    ContractLocationUnset,
}

impl CatalogError {
    /// Integrity failures escalate above the generic skip handling
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, CatalogError::ChecksumMismatch { .. })
    }
}
