//! Folder discovery.
//!
//! Walks a case folder recursively and returns the files to process, sorted
//! by relative path. Files matching any `paths.exclude_globs` pattern (hidden
//! files by default) are skipped.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file found under the case folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Path relative to the folder, `/`-separated. Used as the document's
    /// filename throughout the run, so it is unique within a folder.
    pub relative: String,
}

pub fn scan_folder(root: &Path, exclude_globs: &[String]) -> Result<Vec<ScannedFile>> {
    if !root.is_dir() {
        bail!("Folder does not exist: {}", root.display());
    }

    let exclude_set = build_globset(exclude_globs)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        files.push(ScannedFile {
            path: path.to_path_buf(),
            relative: rel_str,
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn default_excludes() -> Vec<String> {
        vec!["**/.*".to_string(), ".*".to_string()]
    }

    #[test]
    fn finds_nested_files_sorted_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("anexos")).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.pdf"), "a").unwrap();
        std::fs::write(tmp.path().join("anexos/c.txt"), "c").unwrap();
        std::fs::write(tmp.path().join(".DS_Store"), "x").unwrap();
        std::fs::write(tmp.path().join("anexos/.hidden"), "x").unwrap();

        let files = scan_folder(tmp.path(), &default_excludes()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "anexos/c.txt", "b.txt"]);
    }

    #[test]
    fn custom_excludes_apply() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("keep.txt"), "k").unwrap();
        std::fs::write(tmp.path().join("drop.tmp"), "d").unwrap();

        let files = scan_folder(tmp.path(), &["*.tmp".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "keep.txt");
    }

    #[test]
    fn missing_folder_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_folder(&tmp.path().join("nope"), &[]).is_err());
    }

    #[test]
    fn invalid_glob_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_folder(tmp.path(), &["[".to_string()]).is_err());
    }
}
