/// Data model for the two mirror manifests and the optional broken-path list.
///
/// - [`PathsManifest`]: what should exist upstream, grouped by category
/// - [`DocsManifest`]: what was actually fetched, keyed by canonical filename
/// - [`BrokenPaths`]: paths known to no longer resolve upstream
///
/// Unknown fields are carried through `extra` so a load/save cycle never drops data
/// written by other tools.
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::canonical::normalize;
use crate::error::CommonError;
use crate::json::{read_json, write_json_atomic};

// --- Paths manifest ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsManifest {
    pub metadata: PathsMetadata,
    /// Category name to the ordered paths discovered under it.
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsMetadata {
    pub total_paths: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_at: Option<String>,
    /// Signed so that a zero or negative value can be reported rather than rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_broken_paths: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_total_paths: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PathsManifest {
    /// Build a manifest whose `total_paths` matches its categories.
    pub fn from_categories(categories: BTreeMap<String, Vec<String>>) -> Self {
        let total_paths = categories.values().map(Vec::len).sum();
        Self {
            metadata: PathsMetadata {
                total_paths,
                cleaned_at: None,
                removed_broken_paths: None,
                original_total_paths: None,
                extra: Map::new(),
            },
            categories,
            extra: Map::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CommonError> {
        let manifest: Self = read_json(path)?;
        info!(
            path = %path.display(),
            categories = manifest.categories.len(),
            total_paths = manifest.metadata.total_paths,
            "loaded paths manifest"
        );
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), CommonError> {
        write_json_atomic(path, self)
    }

    /// Number of paths actually listed, counting repeats.
    pub fn actual_total(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Every `(category, path)` pair in category order.
    pub fn iter_paths(&self) -> impl Iterator<Item = (&str, &str)> {
        self.categories
            .iter()
            .flat_map(|(category, paths)| paths.iter().map(move |p| (category.as_str(), p.as_str())))
    }

    /// Flattened path set with leading/trailing slashes stripped, the form links resolve against.
    pub fn normalized_paths(&self) -> HashSet<&str> {
        self.iter_paths().map(|(_, path)| normalize(path)).collect()
    }
}

// --- Docs manifest ---

/// Which on-disk shape a docs manifest was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocsManifestFormat {
    /// `{"files": {name: record}}` or a bare `{name: record}` object.
    Mapping,
    /// A bare list of filenames (or `{"files": [...]}`); carries no per-file records.
    Sequence,
}

/// Provenance of one fetched file. Every field is optional on disk so that missing
/// fields can be reported by the validators instead of failing the load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_md_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocRecord {
    /// Record for a page retrieved from upstream.
    pub fn fetched(hash: &str, last_updated: &str, original_url: &str, original_md_url: &str) -> Self {
        Self {
            hash: Some(hash.to_string()),
            last_updated: Some(last_updated.to_string()),
            original_url: Some(original_url.to_string()),
            original_md_url: Some(original_md_url.to_string()),
            extra: Map::new(),
        }
    }

    /// Record for a hand-maintained file that has no upstream source.
    pub fn local(hash: &str, last_updated: &str) -> Self {
        Self {
            hash: Some(hash.to_string()),
            last_updated: Some(last_updated.to_string()),
            ..Self::default()
        }
    }
}

enum RawFiles {
    Mapping(BTreeMap<String, DocRecord>),
    Sequence(Vec<String>),
}

impl RawFiles {
    /// Decode by JSON shape, so a bad record reports its own error instead of the
    /// whole document being retried as another shape.
    fn decode(value: Value, origin: &Path) -> Result<Self, CommonError> {
        let decoded = match value {
            Value::Object(_) => serde_json::from_value(value).map(Self::Mapping),
            Value::Array(_) => serde_json::from_value(value).map(Self::Sequence),
            _ => {
                return Err(CommonError::Schema {
                    path: origin.to_path_buf(),
                    message: "expected {\"files\": {...}}, a filename-to-record object, or a list of filenames"
                        .to_string(),
                })
            }
        };
        decoded.map_err(|e| CommonError::Schema {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[derive(Serialize)]
struct WrappedFiles<'a> {
    files: &'a BTreeMap<String, DocRecord>,
}

/// Docs manifest normalized to the mapping form, whatever shape it was stored in.
#[derive(Debug, Clone, PartialEq)]
pub struct DocsManifest {
    format: DocsManifestFormat,
    files: BTreeMap<String, DocRecord>,
}

impl DocsManifest {
    pub fn from_records(files: BTreeMap<String, DocRecord>) -> Self {
        Self {
            format: DocsManifestFormat::Mapping,
            files,
        }
    }

    pub fn load(path: &Path) -> Result<Self, CommonError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CommonError::io(path, e))?;
        let manifest = Self::parse(&raw, path)?;
        info!(
            path = %path.display(),
            files = manifest.len(),
            format = ?manifest.format,
            "loaded docs manifest"
        );
        Ok(manifest)
    }

    /// Parse either accepted shape. `origin` is only used in error messages.
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, CommonError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| CommonError::json(origin, e))?;
        // A top-level `files` key means the wrapped form; its siblings are fetch metadata.
        let files = match value {
            Value::Object(mut map) if map.contains_key("files") => {
                let files = map.remove("files").unwrap_or(Value::Null);
                RawFiles::decode(files, origin)?
            }
            bare => RawFiles::decode(bare, origin)?,
        };

        Ok(match files {
            RawFiles::Mapping(files) => Self::from_records(files),
            RawFiles::Sequence(names) => {
                let listed = names.len();
                let files: BTreeMap<String, DocRecord> = names
                    .into_iter()
                    .map(|name| (name, DocRecord::default()))
                    .collect();
                if files.len() != listed {
                    warn!(
                        path = %origin.display(),
                        repeated = listed - files.len(),
                        "docs manifest lists some filenames more than once"
                    );
                }
                Self {
                    format: DocsManifestFormat::Sequence,
                    files,
                }
            }
        })
    }

    /// Always writes the wrapped mapping form.
    pub fn save(&self, path: &Path) -> Result<(), CommonError> {
        write_json_atomic(path, &WrappedFiles { files: &self.files })
    }

    pub fn format(&self) -> DocsManifestFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn get(&self, filename: &str) -> Option<&DocRecord> {
        self.files.get(filename)
    }

    /// Per-file records, only available when the manifest was stored as a mapping.
    pub fn records(&self) -> Option<&BTreeMap<String, DocRecord>> {
        match self.format {
            DocsManifestFormat::Mapping => Some(&self.files),
            DocsManifestFormat::Sequence => None,
        }
    }
}

// --- Broken paths ---

/// Output of the broken-path categorization step. Only `deprecated_paths` is consumed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokenPaths {
    #[serde(default)]
    pub deprecated_paths: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BrokenPaths {
    /// Load the categorization if it exists; a missing file is `Ok(None)`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, CommonError> {
        if !path.exists() {
            info!(path = %path.display(), "no broken-path categorization, using file-existence checks only");
            return Ok(None);
        }
        let broken: Self = read_json(path)?;
        info!(
            path = %path.display(),
            deprecated = broken.deprecated_paths.len(),
            "loaded broken-path categorization"
        );
        Ok(Some(broken))
    }

    pub fn deprecated(&self) -> HashSet<&str> {
        self.deprecated_paths.iter().map(String::as_str).collect()
    }
}
