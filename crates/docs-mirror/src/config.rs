use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use mirror_common::layout::MirrorLayout;

use crate::error::AppError;
use crate::links::LinkRules;

// --- Tolerances ---
//
// Tuned against the live upstream site, which is noisy: some catalogued pages are
// HTML-only, redirect elsewhere, or exist only as per-language SDK variants.

/// Catalogued paths may lack a file on disk, but past this share the manifest has
/// desynchronized from what the fetcher can actually retrieve.
pub const ORPHAN_CEILING_PCT: f64 = 20.0;

/// Looser than the orphan ceiling: links also point at pages hosted off the mirrored
/// domain or generated dynamically, which discovery never sees.
pub const BROKEN_LINK_CEILING_PCT: f64 = 30.0;

/// A corpus this size always has well over a hundred internal links. Fewer means the
/// extraction pattern broke, whatever the broken-link percentage says.
pub const MIN_INTERNAL_LINKS: usize = 100;

/// Pages that exist on every fetch (the core product docs).
pub const MIN_MANIFEST_FILES: usize = 44;

/// Floor for documents on disk; a fetch that produced fewer lost pages wholesale.
pub const MIN_DISK_FILES: usize = 250;

/// Documents on disk may exceed the catalogue by this many hand-maintained files.
pub const DISK_FILE_SLACK: usize = 10;

/// Share of link texts that must not be generic phrases such as "here".
pub const MIN_DESCRIPTIVE_TEXT_PCT: f64 = 50.0;

/// Diagnostic samples are capped so a failing report stays readable.
pub const MAX_SAMPLES: usize = 10;

/// Files maintained in the mirror itself; they carry no upstream URLs.
pub const LOCAL_FILES: &[&str] = &["changelog.md"];

#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub orphan_ceiling_pct: f64,
    pub broken_link_ceiling_pct: f64,
    pub min_internal_links: usize,
    pub min_manifest_files: usize,
    pub min_disk_files: usize,
    pub disk_file_slack: usize,
    pub min_descriptive_text_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            orphan_ceiling_pct: ORPHAN_CEILING_PCT,
            broken_link_ceiling_pct: BROKEN_LINK_CEILING_PCT,
            min_internal_links: MIN_INTERNAL_LINKS,
            min_manifest_files: MIN_MANIFEST_FILES,
            min_disk_files: MIN_DISK_FILES,
            disk_file_slack: DISK_FILE_SLACK,
            min_descriptive_text_pct: MIN_DESCRIPTIVE_TEXT_PCT,
        }
    }
}

/// Pipeline configuration: where the mirror lives and how strict the checks are.
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: MirrorLayout,
    pub thresholds: Thresholds,
    pub links: LinkRules,
    /// Docs-manifest entries exempt from the upstream URL fields.
    pub local_files: BTreeSet<String>,
}

impl Config {
    /// Configuration with the default thresholds for the mirror at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: MirrorLayout::new(root),
            thresholds: Thresholds::default(),
            links: LinkRules::default(),
            local_files: LOCAL_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Load configuration for the mirror at `root`, applying environment overrides.
    ///
    /// Optional:
    /// - `DOCS_MIRROR_ORPHAN_CEILING_PCT`
    /// - `DOCS_MIRROR_BROKEN_LINK_CEILING_PCT`
    /// - `DOCS_MIRROR_MIN_INTERNAL_LINKS`
    /// - `DOCS_MIRROR_MIN_MANIFEST_FILES`
    /// - `DOCS_MIRROR_MIN_DISK_FILES`
    pub fn from_env(root: PathBuf) -> Result<Self, AppError> {
        if !root.is_dir() {
            return Err(AppError::Config(format!(
                "mirror root {} is not a directory",
                root.display()
            )));
        }

        let mut config = Self::new(root);
        let t = &mut config.thresholds;
        if let Some(v) = env_override("DOCS_MIRROR_ORPHAN_CEILING_PCT")? {
            t.orphan_ceiling_pct = v;
        }
        if let Some(v) = env_override("DOCS_MIRROR_BROKEN_LINK_CEILING_PCT")? {
            t.broken_link_ceiling_pct = v;
        }
        if let Some(v) = env_override("DOCS_MIRROR_MIN_INTERNAL_LINKS")? {
            t.min_internal_links = v;
        }
        if let Some(v) = env_override("DOCS_MIRROR_MIN_MANIFEST_FILES")? {
            t.min_manifest_files = v;
        }
        if let Some(v) = env_override("DOCS_MIRROR_MIN_DISK_FILES")? {
            t.min_disk_files = v;
        }
        Ok(config)
    }
}

fn env_override<T: FromStr>(name: &str) -> Result<Option<T>, AppError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}")))
}
