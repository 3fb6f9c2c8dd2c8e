/// Full-text search index persisted next to the mirrored documents.
///
/// The index is an inverted map from term to the sorted list of files that mention it.
/// `indexed_files` must equal the docs manifest entry count at build time; that equality
/// is how the validators detect an index that drifted from the manifest it came from.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;
use crate::json::{read_json, write_json_atomic};

const MIN_TERM_LEN: usize = 2;
const MAX_TERM_LEN: usize = 48;

const STOPWORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "by", "for", "from", "if", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "was", "with",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub indexed_files: usize,
    /// Term to the sorted filenames containing it.
    pub index: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub documents: BTreeMap<String, IndexedDocument>,
}

/// Per-file summary stored alongside the term map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Text of the first markdown heading, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Content hash copied from the docs manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Number of distinct terms the file contributed.
    pub terms: usize,
}

impl SearchIndex {
    pub fn load(path: &Path) -> Result<Self, CommonError> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), CommonError> {
        write_json_atomic(path, self)
    }

    /// Files mentioning `term`. The term goes through the same tokenizer as documents.
    pub fn lookup(&self, term: &str) -> &[String] {
        let Some(key) = tokenize(term).into_iter().next() else {
            return &[];
        };
        self.index.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files mentioning every term of `query`, sorted.
    pub fn lookup_all(&self, query: &str) -> Vec<String> {
        let terms = tokenize(query);
        let mut matches: Option<BTreeSet<&str>> = None;
        for term in &terms {
            let files: BTreeSet<&str> = self
                .index
                .get(term)
                .map(|files| files.iter().map(String::as_str).collect())
                .unwrap_or_default();
            matches = Some(match matches {
                Some(acc) => acc.intersection(&files).copied().collect(),
                None => files,
            });
        }
        matches
            .unwrap_or_default()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// Split text into distinct lowercase index terms, in first-seen order.
///
/// Terms are runs of alphanumeric characters; very short, very long and stopword terms
/// are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut terms = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let len = raw.chars().count();
        if !(MIN_TERM_LEN..=MAX_TERM_LEN).contains(&len) {
            continue;
        }
        let term = raw.to_lowercase();
        if STOPWORDS.contains(&term.as_str()) {
            continue;
        }
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> SearchIndex {
        let mut index = BTreeMap::new();
        index.insert("hooks".to_string(), vec!["a.md".to_string(), "b.md".to_string()]);
        index.insert("mcp".to_string(), vec!["b.md".to_string()]);
        SearchIndex {
            indexed_files: 2,
            index,
            documents: BTreeMap::new(),
        }
    }

    #[test]
    fn test_tokenize() {
        let terms = tokenize("The Hooks guide: configure hooks, MCP servers and a x");
        assert_eq!(terms, vec!["hooks", "guide", "configure", "mcp", "servers"]);
    }

    #[test]
    fn test_tokenize_unicode() {
        assert_eq!(tokenize("Café déjà-vu"), vec!["café", "déjà", "vu"]);
    }

    #[test]
    fn test_lookup_normalizes_term() {
        let index = sample_index();
        assert_eq!(index.lookup("HOOKS"), ["a.md".to_string(), "b.md".to_string()]);
        assert_eq!(index.lookup(" mcp "), ["b.md".to_string()]);
        assert!(index.lookup("missing").is_empty());
        assert!(index.lookup("").is_empty());
    }

    #[test]
    fn test_lookup_all_intersects() {
        let index = sample_index();
        assert_eq!(index.lookup_all("hooks mcp"), vec!["b.md"]);
        assert_eq!(index.lookup_all("hooks"), vec!["a.md", "b.md"]);
        assert!(index.lookup_all("hooks missing").is_empty());
        assert!(index.lookup_all("").is_empty());
    }

    #[test]
    fn test_missing_documents_field_defaults() {
        let index: SearchIndex =
            serde_json::from_str(r#"{"indexed_files": 1, "index": {"term": ["a.md"]}}"#).unwrap();
        assert_eq!(index.indexed_files, 1);
        assert!(index.documents.is_empty());
    }
}
