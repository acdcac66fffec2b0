//! Markdown documentation for a single Tekton resource
//!
//! Renders the resource name and description followed by its workspaces,
//! params and results as Markdown tables.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml_ng::Value;
use std::fmt::Write;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: Spec,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Spec {
    #[serde(default)]
    description: String,
    #[serde(default)]
    workspaces: Vec<Workspace>,
    #[serde(default)]
    params: Vec<Param>,
    #[serde(default)]
    results: Vec<ResultSpec>,
}

#[derive(Debug, Deserialize)]
struct Workspace {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Deserialize)]
struct Param {
    name: String,
    #[serde(default, rename = "type")]
    param_type: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    default: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResultSpec {
    name: String,
    #[serde(default)]
    description: String,
}

/// Render the resource file at `path`
pub fn render_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read resource file: {}", path.display()))?;
    render(&content).with_context(|| format!("Failed to render {}", path.display()))
}

/// Render a resource manifest as Markdown
pub fn render(content: &str) -> Result<String> {
    let doc: Document = serde_yaml_ng::from_str(content).context("Invalid resource YAML")?;

    let mut md = String::new();
    let title = if doc.metadata.name.is_empty() {
        doc.kind.as_str()
    } else {
        doc.metadata.name.as_str()
    };
    writeln!(md, "# `{title}`")?;

    let description = doc.spec.description.trim();
    if !description.is_empty() {
        writeln!(md)?;
        writeln!(md, "{description}")?;
    }

    if !doc.spec.workspaces.is_empty() {
        writeln!(md)?;
        writeln!(md, "## Workspaces")?;
        writeln!(md)?;
        writeln!(md, "| Workspace | Optional | Description |")?;
        writeln!(md, "| :-------- | :------: | :---------- |")?;
        for ws in &doc.spec.workspaces {
            writeln!(
                md,
                "| `{}` | `{}` | {} |",
                ws.name,
                ws.optional,
                cell(&ws.description)
            )?;
        }
    }

    if !doc.spec.params.is_empty() {
        writeln!(md)?;
        writeln!(md, "## Params")?;
        writeln!(md)?;
        writeln!(md, "| Param | Type | Default | Description |")?;
        writeln!(md, "| :---- | :--: | :------ | :---------- |")?;
        for param in &doc.spec.params {
            let default = match &param.default {
                Some(value) => format!("`{}`", default_value(value)?),
                None => "(required)".to_string(),
            };
            writeln!(
                md,
                "| `{}` | `{}` | {} | {} |",
                param.name,
                param.param_type.as_deref().unwrap_or("string"),
                default,
                cell(&param.description)
            )?;
        }
    }

    if !doc.spec.results.is_empty() {
        writeln!(md)?;
        writeln!(md, "## Results")?;
        writeln!(md)?;
        writeln!(md, "| Result | Description |")?;
        writeln!(md, "| :----- | :---------- |")?;
        for result in &doc.spec.results {
            writeln!(md, "| `{}` | {} |", result.name, cell(&result.description))?;
        }
    }

    Ok(md)
}

/// Table cells must fit on one line
fn cell(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

fn default_value(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).context("Failed to render default value")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TASK: &str = r#"apiVersion: tekton.dev/v1
kind: Task
metadata:
  name: git-clone
spec:
  description: >-
    Clones a git repository
    into the source workspace.
  workspaces:
    - name: source
      description: Where the repository is cloned
    - name: ssh-directory
      optional: true
  params:
    - name: url
      description: Repository URL
    - name: revision
      default: main
    - name: flags
      type: array
      default: ["--depth", "1"]
  results:
    - name: commit
      description: The precise commit SHA | fetched
"#;

    #[test]
    fn test_render_task() {
        let md = render(TASK).unwrap();
        let expected = "\
# `git-clone`

Clones a git repository into the source workspace.

## Workspaces

| Workspace | Optional | Description |
| :-------- | :------: | :---------- |
| `source` | `false` | Where the repository is cloned |
| `ssh-directory` | `true` |  |

## Params

| Param | Type | Default | Description |
| :---- | :--: | :------ | :---------- |
| `url` | `string` | (required) | Repository URL |
| `revision` | `string` | `main` |  |
| `flags` | `array` | `[\"--depth\",\"1\"]` |  |

## Results

| Result | Description |
| :----- | :---------- |
| `commit` | The precise commit SHA \\| fetched |
";
        assert_eq!(md, expected);
    }

    #[test]
    fn test_render_minimal() {
        let md = render("kind: Pipeline\nmetadata:\n  name: build\n").unwrap();
        assert_eq!(md, "# `build`\n");
    }

    #[test]
    fn test_render_invalid_yaml() {
        assert!(render("spec: [unterminated").is_err());
    }
}
