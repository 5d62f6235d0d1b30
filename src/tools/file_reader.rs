//! Workspace file reader: plain text and PDF.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{required_str, single_string_schema, Tool};

/// Files larger than this are refused.
pub const MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;

/// Longer output is truncated to this many characters.
pub const MAX_CHARS_RETURN: usize = 10_000;

/// Read text out of a file inside the workspace.
pub struct FileReader;

#[async_trait]
impl Tool for FileReader {
    fn name(&self) -> &str {
        "file_reader"
    }

    fn description(&self) -> &str {
        "Reads content from specified files. Supports plain text and PDF. Use 'file_path' for the path relative to the workspace (uploaded files live under 'uploads/'). Max content returned: 10000 chars."
    }

    fn parameters_schema(&self) -> Value {
        single_string_schema(
            "file_path",
            "The relative path to the file (e.g., 'docs/report.pdf', 'notes.txt').",
        )
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String> {
        let file_path = required_str(&args, "file_path")?.trim();
        tracing::debug!(file_path, workspace = %workspace.display(), "file_reader called");

        let resolved = resolve_in_workspace(file_path, workspace)?;

        let metadata = tokio::fs::metadata(&resolved).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => anyhow::anyhow!("File not found at '{}'", file_path),
            std::io::ErrorKind::PermissionDenied => {
                anyhow::anyhow!("Permission denied for file '{}'", file_path)
            }
            _ => anyhow::anyhow!("Cannot access '{}': {}", file_path, e),
        })?;
        if !metadata.is_file() {
            anyhow::bail!("Path '{}' is not a file.", file_path);
        }
        if metadata.len() > MAX_FILE_SIZE_BYTES {
            anyhow::bail!(
                "File '{}' too large (>{:.1}MB).",
                file_path,
                MAX_FILE_SIZE_BYTES as f64 / (1024.0 * 1024.0)
            );
        }

        let bytes = tokio::fs::read(&resolved)
            .await
            .with_context(|| format!("Error reading file '{}'", file_path))?;

        let is_pdf = resolved
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        let content = if is_pdf {
            let text = extract_pdf_text(bytes, file_path).await?;
            if text.trim().is_empty() {
                return Ok(format!(
                    "Info: PDF file '{}' was read, but no text content could be extracted (it might be an image-based PDF or empty).",
                    file_path
                ));
            }
            text
        } else {
            String::from_utf8(bytes).map_err(|_| {
                anyhow::anyhow!(
                    "Could not decode file '{}' using UTF-8. It might be a binary file of an unsupported type or use a different encoding.",
                    file_path
                )
            })?
        };

        tracing::info!(file_path, chars = content.chars().count(), pdf = is_pdf, "Read file");

        if let Some((cut, _)) = content.char_indices().nth(MAX_CHARS_RETURN) {
            return Ok(format!(
                "{}\n... (file content truncated at {} characters)",
                &content[..cut],
                MAX_CHARS_RETURN
            ));
        }

        if content.trim().is_empty() {
            return Ok(format!(
                "Info: File '{}' is empty or contains no readable text content.",
                file_path
            ));
        }

        Ok(content)
    }
}

/// Resolve a user-supplied relative path, refusing anything that leaves the workspace.
fn resolve_in_workspace(file_path: &str, workspace: &Path) -> anyhow::Result<PathBuf> {
    if file_path.is_empty() {
        anyhow::bail!("File path parameter is required.");
    }
    let relative = Path::new(file_path);
    if relative.is_absolute() || relative.has_root() {
        anyhow::bail!("Absolute file paths are not allowed.");
    }
    if relative.components().any(|c| matches!(c, Component::ParentDir)) {
        anyhow::bail!("Path should not contain '..'.");
    }

    let joined = workspace.join(relative);

    // Symlinks may still point elsewhere; compare canonical forms when the file exists.
    if let (Ok(real), Ok(root)) = (joined.canonicalize(), workspace.canonicalize()) {
        if !real.starts_with(&root) {
            tracing::warn!(path = %real.display(), "Access outside workspace denied");
            anyhow::bail!("Access denied. Path is outside allowed directory.");
        }
        return Ok(real);
    }
    Ok(joined)
}

async fn extract_pdf_text(bytes: Vec<u8>, file_path: &str) -> anyhow::Result<String> {
    let label = file_path.to_string();
    let raw = tokio::task::spawn_blocking(move || {
        // pdf-extract can panic on malformed fonts.
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }))
    })
    .await
    .context("PDF extraction task failed")?;

    let raw = match raw {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(file = %label, error = %e, "PDF extraction failed");
            anyhow::bail!("Error reading PDF '{}': invalid or corrupted PDF file. Details: {}", label, e);
        }
        Err(_) => {
            tracing::error!(file = %label, "PDF extraction panicked");
            anyhow::bail!("Error reading PDF '{}': the file uses unsupported or malformed fonts.", label);
        }
    };

    let cleaned = clean_pdf_text(&raw);
    tracing::debug!(file = %label, raw = raw.len(), cleaned = cleaned.len(), "Cleaned PDF text");
    Ok(cleaned)
}

/// Normalize whitespace in text extracted from a PDF.
fn clean_pdf_text(text: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static NEWLINES: OnceLock<Regex> = OnceLock::new();
    let spaces = SPACES.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"));
    let newlines = NEWLINES.get_or_init(|| Regex::new(r"\n{2,}").expect("valid regex"));

    let text = text.replace("\r\n", "\n");
    let text = spaces.replace_all(&text, " ");
    let text = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    newlines.replace_all(&text, "\n").trim().to_string()
}
