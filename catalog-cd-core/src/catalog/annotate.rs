//! Provenance annotation of extracted manifests
//!
//! Manifests are patched line by line rather than re-serialized so comments
//! and formatting survive. The `tekton.dev/source` annotation is added as the
//! first entry of every `annotations:` block that does not carry it yet.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;

/// Annotation key pointing back at the originating repository
pub const SOURCE_ANNOTATION: &str = "tekton.dev/source";

/// Repository URL from a release download URL
///
/// `https://github.com/org/repo/releases/download/v1.0.0/resources.tar.gz`
/// becomes `https://github.com/org/repo`. URLs with fewer than five segments
/// yield an empty string.
pub fn extract_repository_url(resources_uri: &str) -> String {
    let parts: Vec<&str> = resources_uri.split('/').collect();
    if parts.len() < 5 {
        return String::new();
    }
    parts[..5].join("/")
}

/// Add the source annotation to a manifest on disk
///
/// Returns whether the file was rewritten. Files without an `annotations:`
/// block are left alone, and running this twice gives the same content as
/// running it once.
pub fn annotate(manifest: &Path, resources_uri: &str) -> Result<bool> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest: {}", manifest.display()))?;

    let repo_url = extract_repository_url(resources_uri);
    let Some(updated) = annotate_content(&content, &repo_url)? else {
        return Ok(false);
    };

    std::fs::write(manifest, updated)
        .with_context(|| format!("Failed to write manifest: {}", manifest.display()))?;

    Ok(true)
}

/// Annotated content, or `None` when nothing had to change
pub(crate) fn annotate_content(content: &str, repo_url: &str) -> Result<Option<String>> {
    let annotations_pattern = Regex::new(r"^\s+annotations:\s*$")?;
    let source_pattern = Regex::new(r#"^\s+tekton\.dev/source:\s*".*"$"#)?;

    let lines: Vec<&str> = content.lines().collect();
    let mut output: Vec<String> = Vec::with_capacity(lines.len() + 1);
    let mut changed = false;

    for (i, line) in lines.iter().enumerate() {
        output.push(line.to_string());

        if !annotations_pattern.is_match(line) {
            continue;
        }

        let key_indent = indentation(line);
        let mut child_indent = None;
        let mut present = false;

        for next in lines.iter().skip(i + 1) {
            if next.trim().is_empty() {
                continue;
            }
            let indent = indentation(next);
            if indent <= key_indent {
                break;
            }
            child_indent.get_or_insert(indent);
            if source_pattern.is_match(next) {
                present = true;
                break;
            }
        }

        if !present {
            let indent = child_indent.unwrap_or(key_indent + 2);
            output.push(format!(
                "{}{}: \"{}\"",
                " ".repeat(indent),
                SOURCE_ANNOTATION,
                repo_url
            ));
            changed = true;
        }
    }

    if !changed {
        return Ok(None);
    }

    let mut updated = output.join("\n");
    if content.ends_with('\n') {
        updated.push('\n');
    }

    Ok(Some(updated))
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const URI: &str =
        "https://github.com/shortbrain/golang-tasks/releases/download/v0.5.0/resources.tar.gz";

    const TASK: &str = r#"---
apiVersion: tekton.dev/v1
kind: Task
metadata:
  name: go-ko-image
  labels:
    app.kubernetes.io/version: "0.5.0"
  annotations:
    # keep this comment
    tekton.dev/pipelines.minVersion: "0.40.0"
    tekton.dev/categories: language
spec:
  steps: []
"#;

    #[test]
    fn test_extract_repository_url() {
        assert_eq!(
            extract_repository_url(URI),
            "https://github.com/shortbrain/golang-tasks"
        );
        assert_eq!(extract_repository_url("https://fake.host/resources.tar.gz"), "");
    }

    #[test]
    fn test_inserts_first_in_block() {
        let updated = annotate_content(TASK, "https://github.com/shortbrain/golang-tasks")
            .unwrap()
            .unwrap();

        let expected = TASK.replace(
            "  annotations:\n",
            "  annotations:\n    tekton.dev/source: \"https://github.com/shortbrain/golang-tasks\"\n",
        );
        assert_eq!(updated, expected);
    }

    #[test]
    fn test_idempotent() {
        let once = annotate_content(TASK, "https://github.com/org/repo")
            .unwrap()
            .unwrap();
        assert!(annotate_content(&once, "https://github.com/org/repo")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_existing_annotation_left_alone() {
        let content = "metadata:\n  annotations:\n    tekton.dev/categories: git\n    tekton.dev/source: \"https://github.com/other/repo\"\n";
        assert!(annotate_content(content, "https://github.com/org/repo")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_no_annotations_block_untouched() {
        let content = "apiVersion: tekton.dev/v1\nkind: Task\nmetadata:\n  name: foo\n";
        assert!(annotate_content(content, "https://github.com/org/repo")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_follows_child_indentation() {
        let content = "metadata:\n    annotations:\n        a: b\nspec: {}\n";
        let updated = annotate_content(content, "https://github.com/org/repo")
            .unwrap()
            .unwrap();
        assert_eq!(
            updated,
            "metadata:\n    annotations:\n        tekton.dev/source: \"https://github.com/org/repo\"\n        a: b\nspec: {}\n"
        );
    }

    #[test]
    fn test_source_annotation_outside_block_does_not_count() {
        let content = "metadata:\n  annotations:\n    a: b\n  labels:\n    tekton.dev/source: \"x\"\n";
        let updated = annotate_content(content, "https://github.com/org/repo")
            .unwrap()
            .unwrap();
        assert!(updated.starts_with(
            "metadata:\n  annotations:\n    tekton.dev/source: \"https://github.com/org/repo\"\n    a: b\n"
        ));
    }

    #[test]
    fn test_annotate_file_twice() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("go-ko-image.yaml");
        std::fs::write(&file, TASK).unwrap();

        assert!(annotate(&file, URI).unwrap());
        let once = std::fs::read_to_string(&file).unwrap();

        assert!(!annotate(&file, URI).unwrap());
        let twice = std::fs::read_to_string(&file).unwrap();

        assert_eq!(once, twice);
        assert!(once.contains("    tekton.dev/source: \"https://github.com/shortbrain/golang-tasks\"\n"));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(annotate(Path::new("/nonexistent/task.yaml"), URI).is_err());
    }
}
