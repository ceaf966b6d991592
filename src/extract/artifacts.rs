//! Locating extraction output artifacts
//!
//! A finished run leaves `<output_dir>/<stem>/auto/` containing a markdown
//! file and a `*_content_list.json` manifest. The tool sometimes reports a
//! non-zero exit code despite writing both; presence of the artifacts, not
//! the exit code, is the completion signal. The same check doubles as the
//! salvage path for timed-out jobs.

use crate::error::Result;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Usable output recovered from an extraction run
#[derive(Debug, Clone)]
pub struct ExtractedOutput {
    /// Primary markdown text
    pub text: String,
    /// Structured content manifest
    pub content_list: Value,
    /// Directory the artifacts were read from
    pub auto_dir: PathBuf,
}

/// Check for the expected output artifacts of one job
///
/// Returns `Ok(None)` when either artifact is missing or the manifest is
/// unreadable - the job has then produced nothing salvageable.
pub fn find_output(output_dir: &Path, stem: &str) -> Result<Option<ExtractedOutput>> {
    let auto_dir = output_dir.join(stem).join("auto");
    if !auto_dir.is_dir() {
        debug!("No output directory at {}", auto_dir.display());
        return Ok(None);
    }

    let mut markdown: Option<PathBuf> = None;
    let mut manifest: Option<PathBuf> = None;

    for entry in fs::read_dir(&auto_dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if name.ends_with("_content_list.json") {
            manifest.get_or_insert(path);
        } else if name.ends_with(".md") {
            markdown.get_or_insert(path);
        }
    }

    let (md_path, manifest_path) = match (markdown, manifest) {
        (Some(md), Some(mf)) => (md, mf),
        (md, mf) => {
            debug!(
                "Incomplete artifacts in {} (markdown: {}, manifest: {})",
                auto_dir.display(),
                md.is_some(),
                mf.is_some()
            );
            return Ok(None);
        }
    };

    let text = fs::read_to_string(&md_path)?;
    let manifest_raw = fs::read_to_string(&manifest_path)?;
    let content_list: Value = match serde_json::from_str(&manifest_raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "Manifest {} is not valid JSON ({}), treating output as unusable",
                manifest_path.display(),
                e
            );
            return Ok(None);
        }
    };

    Ok(Some(ExtractedOutput {
        text,
        content_list,
        auto_dir,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_artifacts(dir: &Path, stem: &str, manifest: &str) {
        let auto = dir.join(stem).join("auto");
        fs::create_dir_all(&auto).unwrap();
        fs::write(auto.join(format!("{stem}.md")), "# Extracted\n\nBody text.").unwrap();
        fs::write(auto.join(format!("{stem}_content_list.json")), manifest).unwrap();
    }

    #[test]
    fn test_both_artifacts_present() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), "doc", r#"[{"type":"text"}]"#);

        let output = find_output(dir.path(), "doc").unwrap().unwrap();
        assert!(output.text.contains("Body text."));
        assert!(output.content_list.is_array());
    }

    #[test]
    fn test_missing_manifest_is_not_usable() {
        let dir = tempfile::tempdir().unwrap();
        let auto = dir.path().join("doc").join("auto");
        fs::create_dir_all(&auto).unwrap();
        fs::write(auto.join("doc.md"), "text").unwrap();

        assert!(find_output(dir.path(), "doc").unwrap().is_none());
    }

    #[test]
    fn test_missing_markdown_is_not_usable() {
        let dir = tempfile::tempdir().unwrap();
        let auto = dir.path().join("doc").join("auto");
        fs::create_dir_all(&auto).unwrap();
        fs::write(auto.join("doc_content_list.json"), "[]").unwrap();

        assert!(find_output(dir.path(), "doc").unwrap().is_none());
    }

    #[test]
    fn test_no_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_output(dir.path(), "doc").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_manifest_is_not_usable() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), "doc", "{truncated");

        assert!(find_output(dir.path(), "doc").unwrap().is_none());
    }
}
