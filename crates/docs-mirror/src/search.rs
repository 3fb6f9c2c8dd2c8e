/// Search index builder and index consistency check.
///
/// The index is a derived view of the docs manifest: one entry per tracked file, so
/// `indexed_files` always equals the manifest entry count it was built from. Building
/// is deterministic (sorted maps, sorted file lists), so rebuilding unchanged input
/// produces a byte-identical artifact.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::info;

use mirror_common::error::CommonError;
use mirror_common::layout::MirrorLayout;
use mirror_common::manifest::DocsManifest;
use mirror_common::search_index::{tokenize, IndexedDocument, SearchIndex};

use crate::error::AppError;
use crate::model::CheckReport;

pub const SEARCH_INDEX: &str = "search_index";

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+?)[ \t#]*$").expect("valid regex"));

/// Index every file the docs manifest tracks.
///
/// Fails if a tracked file cannot be read: indexing a subset would silently break the
/// count invariant.
pub fn build_index(docs_dir: &Path, docs: &DocsManifest) -> Result<SearchIndex, AppError> {
    let mut postings: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut documents: BTreeMap<String, IndexedDocument> = BTreeMap::new();

    for filename in docs.filenames() {
        let path = docs_dir.join(filename);
        let content = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::MissingDocument(filename.to_string()));
            }
            Err(e) => return Err(CommonError::io(path, e).into()),
        };

        let terms = tokenize(&content);
        for term in &terms {
            postings
                .entry(term.clone())
                .or_default()
                .insert(filename.to_string());
        }
        documents.insert(
            filename.to_string(),
            IndexedDocument {
                title: extract_title(&content),
                hash: docs.get(filename).and_then(|r| r.hash.clone()),
                terms: terms.len(),
            },
        );
    }

    Ok(SearchIndex {
        indexed_files: documents.len(),
        index: postings
            .into_iter()
            .map(|(term, files)| (term, files.into_iter().collect()))
            .collect(),
        documents,
    })
}

/// Rebuild the index from the docs manifest and write it next to the documents.
pub fn rebuild(layout: &MirrorLayout) -> Result<SearchIndex, AppError> {
    let docs = DocsManifest::load(&layout.docs_manifest())?;
    let index = build_index(&layout.docs_dir(), &docs)?;
    index.save(&layout.search_index())?;
    info!(
        path = %layout.search_index().display(),
        indexed_files = index.indexed_files,
        terms = index.index.len(),
        "search index written"
    );
    Ok(index)
}

/// First markdown heading of a document.
fn extract_title(content: &str) -> Option<String> {
    HEADING_RE
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

/// The persisted index must parse, carry `indexed_files` and `index`, agree in
/// cardinality with the docs manifest, hold terms, and reference only tracked files.
pub fn check_search_index(index_path: &Path, docs: &DocsManifest) -> CheckReport {
    let raw = match std::fs::read_to_string(index_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return CheckReport::fail(
                SEARCH_INDEX,
                format!("search index not found at {}", index_path.display()),
            );
        }
        Err(e) => return CheckReport::unavailable(SEARCH_INDEX, &CommonError::io(index_path, e)),
    };

    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => return CheckReport::unavailable(SEARCH_INDEX, &CommonError::json(index_path, e)),
    };
    let missing_keys: Vec<&str> = ["indexed_files", "index"]
        .into_iter()
        .filter(|key| value.get(key).is_none())
        .collect();
    if !missing_keys.is_empty() {
        return CheckReport::fail(
            SEARCH_INDEX,
            format!("search index lacks required keys: {}", missing_keys.join(", ")),
        );
    }

    let index: SearchIndex = match serde_json::from_value(value) {
        Ok(index) => index,
        Err(e) => return CheckReport::unavailable(SEARCH_INDEX, &CommonError::json(index_path, e)),
    };

    let expected = docs.len();
    if index.indexed_files != expected {
        return CheckReport::fail(
            SEARCH_INDEX,
            format!(
                "search index shows {} files, expected {expected} (from docs manifest)",
                index.indexed_files
            ),
        )
        .with_detail("indexed_files", index.indexed_files)
        .with_detail("expected", expected);
    }

    if index.indexed_files > 0 && index.index.is_empty() {
        return CheckReport::fail(
            SEARCH_INDEX,
            format!(
                "search index covers {} files but holds no terms; term extraction may be broken",
                index.indexed_files
            ),
        );
    }

    let tracked: HashSet<&str> = docs.filenames().collect();
    let untracked: BTreeSet<&str> = index
        .index
        .values()
        .flatten()
        .map(String::as_str)
        .filter(|file| !tracked.contains(file))
        .collect();
    if !untracked.is_empty() {
        return CheckReport::fail(
            SEARCH_INDEX,
            format!("search index references {} files the docs manifest does not track", untracked.len()),
        )
        .with_samples(untracked);
    }

    CheckReport::pass(
        SEARCH_INDEX,
        format!("{} files indexed under {} terms", index.indexed_files, index.index.len()),
    )
    .with_detail("indexed_files", index.indexed_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;
    use mirror_common::manifest::DocRecord;

    fn mirror_with(files: &[(&str, &str)]) -> (tempfile::TempDir, MirrorLayout, DocsManifest) {
        let dir = tempfile::tempdir().unwrap();
        let layout = MirrorLayout::new(dir.path());
        std::fs::create_dir_all(layout.docs_dir()).unwrap();
        let mut records = BTreeMap::new();
        for (name, content) in files {
            std::fs::write(layout.document(name), content).unwrap();
            records.insert(name.to_string(), DocRecord::fetched("h", "t", "u", "m"));
        }
        let docs = DocsManifest::from_records(records);
        docs.save(&layout.docs_manifest()).unwrap();
        (dir, layout, docs)
    }

    #[test]
    fn test_indexed_files_matches_manifest() {
        let (_dir, layout, docs) = mirror_with(&[
            ("docs__en__hooks.md", "# Hooks\n\nRun shell commands on events."),
            ("docs__en__mcp.md", "# MCP\n\nConnect servers. Hooks can call MCP tools."),
            ("changelog.md", ""),
        ]);
        std::fs::write(layout.document("untracked.md"), "# Untracked hooks").unwrap();

        let index = build_index(&layout.docs_dir(), &docs).unwrap();
        assert_eq!(index.indexed_files, docs.len());
        assert_eq!(index.lookup("hooks"), ["docs__en__hooks.md".to_string(), "docs__en__mcp.md".to_string()]);
        assert_eq!(index.lookup_all("servers hooks"), vec!["docs__en__mcp.md"]);
        assert_eq!(index.documents["docs__en__hooks.md"].title.as_deref(), Some("Hooks"));
        assert_eq!(index.documents["changelog.md"].terms, 0);
        assert_eq!(index.documents["docs__en__mcp.md"].hash.as_deref(), Some("h"));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (_dir, layout, _docs) = mirror_with(&[
            ("a.md", "# Alpha\n\nsettings permissions"),
            ("b.md", "## Beta ##\n\npermissions sandbox"),
        ]);
        let first = rebuild(&layout).unwrap();
        let first_bytes = std::fs::read(layout.search_index()).unwrap();
        let second = rebuild(&layout).unwrap();
        let second_bytes = std::fs::read(layout.search_index()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(second.documents["b.md"].title.as_deref(), Some("Beta"));
        assert_eq!(SearchIndex::load(&layout.search_index()).unwrap(), first);
    }

    #[test]
    fn test_build_fails_on_missing_document() {
        let (_dir, layout, _docs) = mirror_with(&[("a.md", "alpha")]);
        let mut records = BTreeMap::new();
        records.insert("a.md".to_string(), DocRecord::default());
        records.insert("ghost.md".to_string(), DocRecord::default());
        let docs = DocsManifest::from_records(records);

        let err = build_index(&layout.docs_dir(), &docs).unwrap_err();
        assert!(matches!(err, AppError::MissingDocument(ref name) if name == "ghost.md"));
    }

    #[test]
    fn test_check_search_index() {
        let (_dir, layout, docs) = mirror_with(&[("a.md", "alpha"), ("b.md", "beta")]);
        let report = check_search_index(&layout.search_index(), &docs);
        assert_eq!(report.outcome, Outcome::Fail);
        assert!(report.message.contains("not found"));

        rebuild(&layout).unwrap();
        assert_eq!(check_search_index(&layout.search_index(), &docs).outcome, Outcome::Pass);

        let mut grown = BTreeMap::new();
        for name in ["a.md", "b.md", "c.md"] {
            grown.insert(name.to_string(), DocRecord::default());
        }
        let report = check_search_index(&layout.search_index(), &DocsManifest::from_records(grown));
        assert_eq!(report.outcome, Outcome::Fail);
        assert_eq!(report.details["indexed_files"], 2);
        assert_eq!(report.details["expected"], 3);
    }

    #[test]
    fn test_check_search_index_shape() {
        let (_dir, layout, docs) = mirror_with(&[("a.md", "alpha")]);

        std::fs::write(layout.search_index(), r#"{"index": {}}"#).unwrap();
        let report = check_search_index(&layout.search_index(), &docs);
        assert_eq!(report.outcome, Outcome::Fail);
        assert!(report.message.contains("indexed_files"));

        std::fs::write(layout.search_index(), "not json").unwrap();
        assert_eq!(check_search_index(&layout.search_index(), &docs).outcome, Outcome::Fail);

        std::fs::write(layout.search_index(), r#"{"indexed_files": 1, "index": {}}"#).unwrap();
        let report = check_search_index(&layout.search_index(), &docs);
        assert_eq!(report.outcome, Outcome::Fail);
        assert!(report.message.contains("term extraction"));

        std::fs::write(
            layout.search_index(),
            r#"{"indexed_files": 1, "index": {"alpha": ["zzz.md"]}}"#,
        )
        .unwrap();
        let report = check_search_index(&layout.search_index(), &docs);
        assert_eq!(report.outcome, Outcome::Fail);
        assert_eq!(report.samples, vec!["zzz.md"]);
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title("intro\n\n## Setup ##\ntext").as_deref(), Some("Setup"));
        assert_eq!(extract_title("no heading here"), None);
        assert_eq!(extract_title("#hashtag only"), None);
    }
}
