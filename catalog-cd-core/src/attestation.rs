//! Resource signing and verification through the `cosign` CLI

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error};

/// Environment variable overriding the cosign binary location
pub const COSIGN_PATH_ENV: &str = "CATALOG_CD_COSIGN_PATH";

/// Locate the cosign binary
///
/// `CATALOG_CD_COSIGN_PATH` wins when it points at an existing file,
/// otherwise `cosign` is resolved from `PATH`.
pub fn find_cosign_binary() -> PathBuf {
    if let Ok(path) = std::env::var(COSIGN_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            debug!("Using cosign from {}: {:?}", COSIGN_PATH_ENV, path);
            return path;
        }
    }

    PathBuf::from("cosign")
}

/// Signs and verifies blobs with a cosign key pair
#[derive(Debug, Clone)]
pub struct Cosign {
    key: String,
    binary: PathBuf,
}

impl Cosign {
    /// `key` is a private key for signing or a public key for verification
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            bail!("no attestation key informed");
        }

        Ok(Self {
            key,
            binary: find_cosign_binary(),
        })
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sign `payload`, writing the signature to `signature`
    pub fn sign(&self, payload: &Path, signature: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("sign-blob")
            .arg("--yes")
            .arg("--key")
            .arg(&self.key)
            .arg("--output-signature")
            .arg(signature)
            .arg(payload);

        self.run(cmd)
            .with_context(|| format!("Failed to sign {}", payload.display()))
    }

    /// Verify `blob` against `signature`
    pub fn verify(&self, blob: &Path, signature: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("verify-blob")
            .arg("--key")
            .arg(&self.key)
            .arg("--signature")
            .arg(signature)
            .arg(blob);

        self.run(cmd)
            .with_context(|| format!("Failed to verify {}", blob.display()))
    }

    fn run(&self, mut cmd: Command) -> Result<()> {
        debug!("cosign command: {:?}", cmd);

        let output = cmd.output().with_context(|| {
            format!(
                "Failed to execute {}. Is cosign installed and in your PATH?",
                self.binary.display()
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("cosign failed: {:?}\nStderr: {}", cmd, stderr);
            bail!(
                "cosign exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Script that records its arguments and fails when asked to
    fn fake_cosign(dir: &Path) -> PathBuf {
        let script = dir.join("cosign");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/calls\"\ncase \"$*\" in *tampered*) echo 'invalid signature' >&2; exit 1;; esac\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(Cosign::new("").is_err());
    }

    #[test]
    fn test_sign_and_verify_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let cosign = Cosign::new("cosign.key")
            .unwrap()
            .with_binary(fake_cosign(temp_dir.path()));

        cosign
            .sign(Path::new("task.yaml"), Path::new("task.yaml.sig"))
            .unwrap();
        cosign
            .verify(Path::new("task.yaml"), Path::new("task.yaml.sig"))
            .unwrap();

        let calls = std::fs::read_to_string(temp_dir.path().join("calls")).unwrap();
        assert_eq!(
            calls,
            "sign-blob --yes --key cosign.key --output-signature task.yaml.sig task.yaml\n\
             verify-blob --key cosign.key --signature task.yaml.sig task.yaml\n"
        );
    }

    #[test]
    fn test_failure_reports_stderr() {
        let temp_dir = TempDir::new().unwrap();
        let cosign = Cosign::new("cosign.pub")
            .unwrap()
            .with_binary(fake_cosign(temp_dir.path()));

        let err = cosign
            .verify(Path::new("tampered.yaml"), Path::new("tampered.yaml.sig"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid signature"));
    }

    #[test]
    fn test_missing_binary() {
        let cosign = Cosign::new("cosign.key")
            .unwrap()
            .with_binary("/nonexistent/cosign");
        assert!(cosign
            .sign(Path::new("a.yaml"), Path::new("a.yaml.sig"))
            .is_err());
    }
}
