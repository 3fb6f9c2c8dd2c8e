/// On-disk layout of a documentation mirror.
///
/// All artifacts live under one repository root:
/// - `paths_manifest.json`: every URL path discovered upstream
/// - `docs/`: the flat documents directory, one `.md` file per fetched page
/// - `docs/docs_manifest.json`: provenance of every fetched file
/// - `docs/.search_index.json`: derived full-text index
/// - `analysis/broken_paths_categorized.json`: optional deprecated-path list
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::canonical::DOC_EXTENSION;
use crate::error::CommonError;

pub const PATHS_MANIFEST_FILE: &str = "paths_manifest.json";
pub const DOCS_DIR: &str = "docs";
pub const DOCS_MANIFEST_FILE: &str = "docs_manifest.json";
pub const SEARCH_INDEX_FILE: &str = ".search_index.json";
pub const ANALYSIS_DIR: &str = "analysis";
pub const BROKEN_PATHS_FILE: &str = "broken_paths_categorized.json";

/// Resolved artifact locations for one mirror checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    root: PathBuf,
}

impl MirrorLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths_manifest(&self) -> PathBuf {
        self.root.join(PATHS_MANIFEST_FILE)
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.root.join(DOCS_DIR)
    }

    pub fn docs_manifest(&self) -> PathBuf {
        self.docs_dir().join(DOCS_MANIFEST_FILE)
    }

    pub fn search_index(&self) -> PathBuf {
        self.docs_dir().join(SEARCH_INDEX_FILE)
    }

    pub fn broken_paths(&self) -> PathBuf {
        self.root.join(ANALYSIS_DIR).join(BROKEN_PATHS_FILE)
    }

    /// Full path of a document by its canonical filename.
    pub fn document(&self, filename: &str) -> PathBuf {
        self.docs_dir().join(filename)
    }
}

/// List the document filenames directly inside `docs_dir`.
///
/// Only regular files with the document extension count, including symlinks to them;
/// manifests, the search index and subdirectories are skipped.
pub fn list_documents(docs_dir: &Path) -> Result<BTreeSet<String>, CommonError> {
    let entries = std::fs::read_dir(docs_dir).map_err(|e| CommonError::io(docs_dir, e))?;

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| CommonError::io(docs_dir, e))?;
        let mut file_type = entry
            .file_type()
            .map_err(|e| CommonError::io(entry.path(), e))?;
        if file_type.is_symlink() {
            // Follow the link; dangling links are not documents.
            match std::fs::metadata(entry.path()) {
                Ok(target) => file_type = target.file_type(),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping dangling symlink");
                    continue;
                }
            }
        }
        if !file_type.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 filename");
            continue;
        };
        if name.ends_with(DOC_EXTENSION) {
            names.insert(name);
        }
    }
    Ok(names)
}
