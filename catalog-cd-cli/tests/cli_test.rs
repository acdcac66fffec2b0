//! End-to-end tests for the catalog-cd binary
//!
//! Only commands that stay offline are exercised here; catalog generation is
//! covered by the core crate against an in-memory transport.

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn catalog_cd(args: &[&str], dir: &Path) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_catalog-cd"))
        .args(args)
        .current_dir(dir)
        .output()?)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const TASK: &str = r#"apiVersion: tekton.dev/v1
kind: Task
metadata:
  name: git-clone
spec:
  description: Clones a git repository
  params:
    - name: url
      description: Repository URL
"#;

#[test]
fn test_version() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = catalog_cd(&["version"], temp_dir.path())?;

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), catalog_cd_core::version());
    Ok(())
}

#[test]
fn test_externals_matrix() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(
        temp_dir.path().join("externals.yaml"),
        r#"repositories:
  - name: golang
    url: https://github.com/shortbrain/golang-tasks
    types: [tasks]
    ignore-versions: [v0.1.0, v0.2.0]
  - url: https://github.com/openshift-pipelines/task-containers
"#,
    )?;

    let output = catalog_cd(&["catalog", "externals"], temp_dir.path())?;
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let matrix: serde_json::Value = serde_json::from_str(stdout(&output).trim())?;
    let expected = serde_json::json!({
        "include": [
            {
                "name": "golang",
                "url": "https://github.com/shortbrain/golang-tasks",
                "type": "tasks",
                "ignoreVersions": "v0.1.0,v0.2.0",
                "catalog-name": "catalog.yaml",
                "resources-tarball-name": "resources.tar.gz"
            },
            {
                "name": "task-containers",
                "url": "https://github.com/openshift-pipelines/task-containers",
                "type": "tasks",
                "ignoreVersions": "",
                "catalog-name": "catalog.yaml",
                "resources-tarball-name": "resources.tar.gz"
            },
            {
                "name": "task-containers",
                "url": "https://github.com/openshift-pipelines/task-containers",
                "type": "pipelines",
                "ignoreVersions": "",
                "catalog-name": "catalog.yaml",
                "resources-tarball-name": "resources.tar.gz"
            }
        ]
    });
    assert_eq!(matrix, expected);
    Ok(())
}

#[test]
fn test_externals_missing_config() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = catalog_cd(
        &["catalog", "externals", "--config", "missing.yaml"],
        temp_dir.path(),
    )?;

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Could not load external configuration"));
    Ok(())
}

#[test]
fn test_generate_from_rejects_unknown_type() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = catalog_cd(
        &[
            "catalog",
            "generate-from",
            "--url",
            "https://github.com/org/repo",
            "--type",
            "deployments",
            "out",
        ],
        temp_dir.path(),
    )?;

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid resource type"));
    Ok(())
}

#[test]
fn test_release_writes_contract_and_tarball() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = temp_dir.path().join("src/git-clone");
    std::fs::create_dir_all(&source)?;
    std::fs::write(source.join("git-clone.yaml"), TASK)?;
    std::fs::write(source.join("README.md"), "# git-clone\n")?;

    let output = catalog_cd(
        &["release", "--version", "0.3.0", "--output", "release", "src"],
        temp_dir.path(),
    )?;
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let release_dir = temp_dir.path().join("release");
    assert!(release_dir.join("resources.tar.gz").is_file());
    assert!(release_dir.join("tasks/git-clone/README.md").is_file());

    let contract = catalog_cd_core::contract::Contract::from_path(&release_dir)?;
    let tasks = &contract.catalog.resources.tasks;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name, "git-clone");
    assert_eq!(tasks[0].version, "0.3.0");
    assert_eq!(tasks[0].filename, "tasks/git-clone/git-clone.yaml");
    Ok(())
}

#[test]
fn test_release_requires_version() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = catalog_cd(&["release", "."], temp_dir.path())?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_render_prints_markdown() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(temp_dir.path().join("task.yaml"), TASK)?;

    let output = catalog_cd(&["render", "task.yaml"], temp_dir.path())?;
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let markdown = stdout(&output);
    assert!(markdown.starts_with("# `git-clone`\n\nClones a git repository\n"));
    assert!(markdown.contains("| `url` | `string` | (required) | Repository URL |"));
    Ok(())
}

#[test]
fn test_verify_needs_public_key() -> Result<()> {
    let temp_dir = TempDir::new()?;
    catalog_cd_core::contract::Contract::empty()
        .save_as(&temp_dir.path().join("catalog.yaml"))?;

    let output = catalog_cd(&["verify", "."], temp_dir.path())?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("publicKeyRef"));
    Ok(())
}
