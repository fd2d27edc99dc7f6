//! File write and edit tools with transcript-oriented result text.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::audit::{AuditEvent, AuditLogger};
use crate::config::FileConfig;
use crate::executor::{ToolError, ToolExecutor, parse_params};

const PREVIEW_LINES: usize = 10;
const SNIPPET_CONTEXT: usize = 3;

#[derive(Debug, Deserialize)]
pub struct WriteParams {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub struct EditParams {
    pub path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Default)]
pub struct FileExecutor {
    allowed_paths: Vec<PathBuf>,
    audit_logger: Option<Arc<AuditLogger>>,
}

impl FileExecutor {
    #[must_use]
    pub fn new(config: &FileConfig) -> Self {
        Self {
            allowed_paths: config
                .allowed_paths
                .iter()
                .map(|root| resolve(Path::new(root)))
                .collect(),
            audit_logger: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    /// Is `path`, lexically resolved, under one of the allowed roots?
    /// An empty allowlist admits everything.
    fn path_allowed(&self, path: &Path) -> bool {
        if self.allowed_paths.is_empty() {
            return true;
        }
        let target = resolve(path);
        self.allowed_paths
            .iter()
            .any(|root| target.starts_with(root))
    }

    /// Create or replace a file. Refuses to clobber an existing file
    /// unless `overwrite` is set.
    pub async fn write(&self, params: &WriteParams) -> String {
        let path = Path::new(&params.path);
        if !self.path_allowed(path) {
            return format!("Error: {} is outside the allowed paths.", params.path);
        }
        if path.exists() && !params.overwrite {
            return format!(
                "Error: {} already exists. Pass overwrite=true to replace it.",
                params.path
            );
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return format!("Error: cannot create parent directory: {e}");
        }

        if let Err(e) = tokio::fs::write(path, &params.content).await {
            return format!("Error: cannot write {}: {e}", params.path);
        }

        let total_lines = params.content.lines().count();
        if let Some(ref logger) = self.audit_logger {
            logger
                .log(&AuditEvent::ToolFileWrite {
                    path: params.path.clone(),
                    lines_written: total_lines,
                    overwrite: params.overwrite,
                })
                .await;
        }

        let preview: Vec<&str> = params.content.lines().take(PREVIEW_LINES).collect();
        let mut out = format!("File written: {} ({total_lines} lines)", params.path);
        if !preview.is_empty() {
            out.push_str("\nPreview:\n");
            out.push_str(&preview.join("\n"));
            if total_lines > PREVIEW_LINES {
                out.push_str("\n...");
            }
        }
        out
    }

    /// Replace an exact string in an existing file.
    ///
    /// A non-unique `old_string` is rejected unless `replace_all` is set,
    /// so a vague edit cannot silently touch the wrong site.
    pub async fn edit(&self, params: &EditParams) -> String {
        if !self.path_allowed(Path::new(&params.path)) {
            return format!("Error: {} is outside the allowed paths.", params.path);
        }
        if params.old_string == params.new_string {
            return "Error: old_string and new_string are identical.".into();
        }

        let content = match tokio::fs::read_to_string(&params.path).await {
            Ok(content) => content,
            Err(e) => return format!("Error: cannot read {}: {e}", params.path),
        };

        let occurrences = content.matches(&params.old_string).count();
        if occurrences == 0 {
            return format!("Error: old_string not found in {}.", params.path);
        }
        if occurrences > 1 && !params.replace_all {
            return format!(
                "Error: old_string occurs {occurrences} times in {}. Pass replace_all=true or make it unique.",
                params.path
            );
        }

        let (updated, replacements) = if params.replace_all {
            (
                content.replace(&params.old_string, &params.new_string),
                occurrences,
            )
        } else {
            (
                content.replacen(&params.old_string, &params.new_string, 1),
                1,
            )
        };

        if let Err(e) = tokio::fs::write(&params.path, &updated).await {
            return format!("Error: cannot write {}: {e}", params.path);
        }

        if let Some(ref logger) = self.audit_logger {
            logger
                .log(&AuditEvent::ToolFileEdit {
                    path: params.path.clone(),
                    replacements,
                })
                .await;
        }

        format!(
            "Edited {} ({replacements} replacement{}).\n{}",
            params.path,
            if replacements == 1 { "" } else { "s" },
            change_snippet(&updated, &params.new_string)
        )
    }
}

impl ToolExecutor for FileExecutor {
    async fn run_tool(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<String, ToolError> {
        match name {
            "write_file" => {
                let params: WriteParams = parse_params(params)?;
                Ok(self.write(&params).await)
            }
            "edit_file" => {
                let params: EditParams = parse_params(params)?;
                Ok(self.edit(&params).await)
            }
            _ => Err(ToolError::UnknownTool { name: name.into() }),
        }
    }
}

/// Absolute, lexically normalized form of a path. `.` and `..`
/// components are folded out without touching the filesystem, so a
/// traversal like `allowed/../elsewhere` cannot slip past the prefix
/// check on a path that does not exist yet.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Numbered context lines around the first changed site.
fn change_snippet(content: &str, new_string: &str) -> String {
    let needle = new_string.lines().next().unwrap_or(new_string);
    let lines: Vec<&str> = content.lines().collect();
    let hit = lines.iter().position(|line| line.contains(needle));

    let Some(hit) = hit else {
        return String::new();
    };
    let start = hit.saturating_sub(SNIPPET_CONTEXT);
    let end = (hit + SNIPPET_CONTEXT + 1).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>5} | {line}", start + i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
