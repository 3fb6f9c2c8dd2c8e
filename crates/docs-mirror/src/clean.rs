/// Manifest cleaning: drop catalogued paths the categorization marked deprecated and
/// stamp provenance so later validation can tell a cleaned manifest from a fresh one.
use std::collections::HashSet;

use tracing::info;

use mirror_common::canonical::normalize;
use mirror_common::manifest::{BrokenPaths, PathsManifest};

use crate::config::Config;
use crate::error::AppError;

/// Result of a cleaning run.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanOutcome {
    pub removed: usize,
    pub remaining: usize,
    /// Whether the manifest file was rewritten.
    pub written: bool,
}

/// Remove deprecated paths from `manifest`.
///
/// Returns `None` when nothing would be removed: a cleaning record with zero removals
/// is not a valid state, so the manifest is left as it is. Categories emptied by the
/// removal are kept. A manifest cleaned before keeps its first `original_total_paths`.
pub fn clean_paths_manifest(
    manifest: &PathsManifest,
    broken: &BrokenPaths,
    cleaned_at: &str,
) -> Option<(PathsManifest, usize)> {
    let deprecated: HashSet<&str> = broken.deprecated_paths.iter().map(|p| normalize(p)).collect();

    let mut cleaned = manifest.clone();
    for paths in cleaned.categories.values_mut() {
        paths.retain(|p| !deprecated.contains(normalize(p)));
    }

    let before = manifest.actual_total();
    let after = cleaned.actual_total();
    let removed = before - after;
    if removed == 0 {
        return None;
    }

    let original = manifest.metadata.original_total_paths.unwrap_or(before);
    let meta = &mut cleaned.metadata;
    meta.total_paths = after;
    meta.cleaned_at = Some(cleaned_at.to_string());
    meta.original_total_paths = Some(original);
    meta.removed_broken_paths = Some(original as i64 - after as i64);
    Some((cleaned, removed))
}

/// Clean the mirror's paths manifest in place, unless `dry_run`.
pub fn run_clean(config: &Config, dry_run: bool) -> Result<CleanOutcome, AppError> {
    let layout = &config.layout;
    let broken = BrokenPaths::load_optional(&layout.broken_paths())?.ok_or_else(|| {
        AppError::Config(format!(
            "cannot clean without a broken-path categorization at {}",
            layout.broken_paths().display()
        ))
    })?;
    let manifest = PathsManifest::load(&layout.paths_manifest())?;

    let now = chrono::Utc::now().to_rfc3339();
    let Some((cleaned, removed)) = clean_paths_manifest(&manifest, &broken, &now) else {
        info!(deprecated = broken.deprecated_paths.len(), "no deprecated paths in manifest, nothing to clean");
        return Ok(CleanOutcome {
            removed: 0,
            remaining: manifest.actual_total(),
            written: false,
        });
    };

    let remaining = cleaned.metadata.total_paths;
    if dry_run {
        info!(removed, remaining, "dry run, manifest not written");
    } else {
        cleaned.save(&layout.paths_manifest())?;
        info!(
            path = %layout.paths_manifest().display(),
            removed,
            remaining,
            cleaned_at = %now,
            "paths manifest cleaned"
        );
    }
    Ok(CleanOutcome {
        removed,
        remaining,
        written: !dry_run,
    })
}
