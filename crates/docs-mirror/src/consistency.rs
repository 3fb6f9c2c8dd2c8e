/// Consistency checks between the paths manifest, the docs manifest and the files on disk.
///
/// Paths-manifest checks tolerate bounded drift where upstream noise is expected
/// (orphaned paths) and are exact everywhere else. Docs-manifest checks have zero
/// tolerance: the fetcher wrote both the manifest and the files, so any mismatch is a bug.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use mirror_common::canonical::{canonicalize, find_collisions, normalize};
use mirror_common::manifest::{BrokenPaths, DocsManifest, PathsManifest};

use crate::config::Thresholds;
use crate::model::{CheckReport, Drift};

pub const DEPRECATED_PATHS: &str = "deprecated_paths";
pub const ORPHAN_PATHS: &str = "orphan_paths";
pub const METADATA_ACCURACY: &str = "metadata_accuracy";
pub const DUPLICATE_PATHS: &str = "duplicate_paths";
pub const CLEANING_PROVENANCE: &str = "cleaning_provenance";
pub const FILENAME_COLLISIONS: &str = "filename_collisions";
pub const DOCS_MANIFEST_FILES: &str = "docs_manifest_files";
pub const DOCS_MANIFEST_FIELDS: &str = "docs_manifest_fields";
pub const FILE_COUNTS: &str = "file_counts";
pub const CONTENT_HASHES: &str = "content_hashes";

const CORE_FIELDS: &[&str] = &["hash", "last_updated"];
const FETCHED_FIELDS: &[&str] = &["original_url", "original_md_url"];

// --- Paths manifest ---

/// Deprecated entries must not linger in the catalogue. Without a categorization the
/// orphan check is the only signal, so this check passes.
pub fn check_deprecated_paths(manifest: &PathsManifest, broken: Option<&BrokenPaths>) -> CheckReport {
    let Some(broken) = broken else {
        return CheckReport::pass(
            DEPRECATED_PATHS,
            "no broken-path categorization available, relying on the orphan check",
        );
    };

    let deprecated: HashSet<&str> = broken.deprecated_paths.iter().map(|p| normalize(p)).collect();
    let lingering: Vec<String> = manifest
        .iter_paths()
        .filter(|(_, path)| deprecated.contains(normalize(path)))
        .map(|(category, path)| format!("[{category}] {path}"))
        .collect();

    if lingering.is_empty() {
        return CheckReport::pass(
            DEPRECATED_PATHS,
            format!("none of {} deprecated paths are catalogued", deprecated.len()),
        );
    }
    CheckReport::fail(
        DEPRECATED_PATHS,
        format!("{} deprecated paths are still catalogued", lingering.len()),
    )
    .with_detail("deprecated", deprecated.len())
    .with_detail("lingering", lingering.len())
    .with_samples(lingering)
}

/// Share of catalogued paths whose canonical file is missing from disk.
pub fn check_orphans(
    manifest: &PathsManifest,
    files_on_disk: &BTreeSet<String>,
    thresholds: &Thresholds,
) -> CheckReport {
    let orphans: Vec<String> = manifest
        .iter_paths()
        .filter_map(|(category, path)| {
            let expected = canonicalize(path);
            (!files_on_disk.contains(&expected))
                .then(|| format!("[{category}] {path} (expected: {expected})"))
        })
        .collect();

    let drift = Drift::new(manifest.actual_total(), orphans.len());
    let summary = format!(
        "{} of {} manifest paths ({:.1}%) have no corresponding doc file on disk",
        drift.offending,
        drift.total,
        drift.percentage()
    );

    let report = if drift.offending == 0 {
        CheckReport::pass(ORPHAN_PATHS, summary)
    } else if drift.within(thresholds.orphan_ceiling_pct) {
        CheckReport::warn(ORPHAN_PATHS, summary)
    } else {
        CheckReport::fail(
            ORPHAN_PATHS,
            format!("{summary}, ceiling is {}%", thresholds.orphan_ceiling_pct),
        )
    };
    report.with_drift(drift).with_samples(orphans)
}

/// `metadata.total_paths` must equal the number of listed paths exactly.
pub fn check_metadata_accuracy(manifest: &PathsManifest) -> CheckReport {
    let stated = manifest.metadata.total_paths;
    let actual = manifest.actual_total();
    let report = if stated == actual {
        CheckReport::pass(METADATA_ACCURACY, format!("total_paths matches: {actual}"))
    } else {
        CheckReport::fail(
            METADATA_ACCURACY,
            format!("metadata mismatch: stated {stated}, actual {actual}"),
        )
    };
    report.with_detail("stated", stated).with_detail("actual", actual)
}

/// No page may be catalogued twice, within or across categories.
///
/// Paths are compared with surrounding slashes stripped, so `/a` and `a/` count as the
/// same page.
pub fn check_duplicates(manifest: &PathsManifest) -> CheckReport {
    let mut seen: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (category, path) in manifest.iter_paths() {
        seen.entry(normalize(path))
            .or_default()
            .push(format!("[{category}] {path}"));
    }

    let duplicates: Vec<String> = seen
        .into_iter()
        .filter(|(_, occurrences)| occurrences.len() > 1)
        .map(|(path, occurrences)| format!("{path}: {}", occurrences.join(", ")))
        .collect();

    if duplicates.is_empty() {
        return CheckReport::pass(DUPLICATE_PATHS, "no duplicate paths");
    }
    CheckReport::fail(
        DUPLICATE_PATHS,
        format!("{} paths appear more than once", duplicates.len()),
    )
    .with_detail("duplicates", duplicates.len())
    .with_samples(duplicates)
}

/// A cleaned manifest must say what the cleaning removed, and it must have removed something.
pub fn check_cleaning_provenance(manifest: &PathsManifest) -> CheckReport {
    let meta = &manifest.metadata;
    let Some(cleaned_at) = meta.cleaned_at.as_deref() else {
        return CheckReport::pass(CLEANING_PROVENANCE, "manifest has not been cleaned");
    };

    let mut problems = Vec::new();
    match meta.removed_broken_paths {
        None => problems.push("removed_broken_paths is missing".to_string()),
        Some(removed) if removed <= 0 => {
            problems.push(format!("removed_broken_paths must be positive, got {removed}"))
        }
        Some(_) => {}
    }
    if meta.original_total_paths.is_none() {
        problems.push("original_total_paths is missing".to_string());
    }

    if problems.is_empty() {
        return CheckReport::pass(
            CLEANING_PROVENANCE,
            format!("cleaned at {cleaned_at}, provenance complete"),
        );
    }
    CheckReport::fail(
        CLEANING_PROVENANCE,
        format!("cleaning provenance incomplete: {}", problems.join("; ")),
    )
    .with_samples(problems)
}

/// Distinct catalogued paths must not share a canonical filename.
pub fn check_filename_collisions(manifest: &PathsManifest) -> CheckReport {
    let collisions = find_collisions(manifest.iter_paths().map(|(_, path)| path));
    if collisions.is_empty() {
        return CheckReport::pass(FILENAME_COLLISIONS, "every path has its own filename");
    }
    let samples: Vec<String> = collisions
        .iter()
        .map(|c| format!("{} <- {}", c.filename, c.paths.join(", ")))
        .collect();
    CheckReport::fail(
        FILENAME_COLLISIONS,
        format!("{} filenames are claimed by more than one path", collisions.len()),
    )
    .with_samples(samples)
}

// --- Docs manifest ---

/// Every docs-manifest entry must exist on disk. Untracked files on disk are allowed
/// and only counted.
pub fn check_docs_manifest_files(docs: &DocsManifest, files_on_disk: &BTreeSet<String>) -> CheckReport {
    let missing: Vec<String> = docs
        .filenames()
        .filter(|name| !files_on_disk.contains(*name))
        .map(str::to_string)
        .collect();
    let tracked: HashSet<&str> = docs.filenames().collect();
    let untracked = files_on_disk
        .iter()
        .filter(|name| !tracked.contains(name.as_str()))
        .count();
    if untracked > 0 {
        debug!(untracked, "documents on disk not tracked by the docs manifest");
    }

    let report = if missing.is_empty() {
        CheckReport::pass(
            DOCS_MANIFEST_FILES,
            format!("all {} manifest entries exist on disk", docs.len()),
        )
    } else {
        CheckReport::fail(
            DOCS_MANIFEST_FILES,
            format!("manifest references {} missing files", missing.len()),
        )
    };
    report
        .with_detail("missing", missing.len())
        .with_detail("untracked", untracked)
        .with_samples(missing)
}

/// Every record carries the core fields; records of fetched files also carry their
/// upstream URLs. A field stored as `null` counts as missing. A sequence-form manifest
/// has no records, so only names are checked.
pub fn check_docs_manifest_fields(docs: &DocsManifest, local_files: &BTreeSet<String>) -> CheckReport {
    let Some(records) = docs.records() else {
        let blank = docs.filenames().filter(|name| name.trim().is_empty()).count();
        if blank > 0 {
            return CheckReport::fail(
                DOCS_MANIFEST_FIELDS,
                format!("{blank} empty filenames in docs manifest"),
            );
        }
        return CheckReport::pass(
            DOCS_MANIFEST_FIELDS,
            "sequence-form manifest: filenames present, no per-file records to check",
        );
    };

    let mut problems = Vec::new();
    for (filename, record) in records {
        if filename.trim().is_empty() {
            problems.push("empty filename in docs manifest".to_string());
        }
        let present = |field: &str| match field {
            "hash" => record.hash.is_some(),
            "last_updated" => record.last_updated.is_some(),
            "original_url" => record.original_url.is_some(),
            "original_md_url" => record.original_md_url.is_some(),
            _ => record.extra.contains_key(field),
        };

        let missing_core: Vec<&str> = CORE_FIELDS.iter().copied().filter(|f| !present(*f)).collect();
        if !missing_core.is_empty() {
            problems.push(format!("{filename} missing core fields: {}", missing_core.join(", ")));
        }
        if !local_files.contains(filename) {
            let missing_fetched: Vec<&str> =
                FETCHED_FIELDS.iter().copied().filter(|f| !present(*f)).collect();
            if !missing_fetched.is_empty() {
                problems.push(format!(
                    "{filename} missing fetched fields: {}",
                    missing_fetched.join(", ")
                ));
            }
        }
    }

    if problems.is_empty() {
        return CheckReport::pass(
            DOCS_MANIFEST_FIELDS,
            format!("all {} records carry their required fields", records.len()),
        );
    }
    CheckReport::fail(
        DOCS_MANIFEST_FIELDS,
        format!("{} docs-manifest records are incomplete", problems.len()),
    )
    .with_samples(problems)
}

/// Bounds under- and over-collection: the manifest must track at least the always-present
/// docs, and the disk must hold between the known minimum and the catalogue size plus slack.
pub fn check_file_counts(
    docs: &DocsManifest,
    files_on_disk: &BTreeSet<String>,
    paths: Option<&PathsManifest>,
    thresholds: &Thresholds,
) -> CheckReport {
    let tracked = docs.len();
    let on_disk = files_on_disk.len();
    let mut problems = Vec::new();

    if tracked < thresholds.min_manifest_files {
        problems.push(format!(
            "expected at least {} files in docs manifest, found {tracked}",
            thresholds.min_manifest_files
        ));
    }
    if on_disk < thresholds.min_disk_files {
        problems.push(format!(
            "too few files on disk: {on_disk} (expected at least {})",
            thresholds.min_disk_files
        ));
    }
    let ceiling = paths.map(|p| p.metadata.total_paths + thresholds.disk_file_slack);
    match ceiling {
        Some(ceiling) if on_disk > ceiling => problems.push(format!(
            "more files on disk ({on_disk}) than catalogued paths allow ({ceiling})"
        )),
        Some(_) => {}
        None => debug!("paths manifest unavailable, skipping the upper file-count bound"),
    }

    let mut report = if problems.is_empty() {
        CheckReport::pass(
            FILE_COUNTS,
            format!("{tracked} tracked files, {on_disk} documents on disk"),
        )
    } else {
        CheckReport::fail(FILE_COUNTS, problems.join("; ")).with_samples(problems)
    };
    report = report
        .with_detail("tracked", tracked)
        .with_detail("on_disk", on_disk);
    if let Some(ceiling) = ceiling {
        report = report.with_detail("ceiling", ceiling);
    }
    report
}

/// Compare each tracked file's SHA-256 with the hash the fetcher recorded.
///
/// A mismatch means the file was edited after the fetch; it is reported as drift, not
/// as a failure, since the next fetch rewrites both.
pub fn check_content_hashes(docs_dir: &Path, docs: &DocsManifest) -> CheckReport {
    let Some(records) = docs.records() else {
        return CheckReport::pass(CONTENT_HASHES, "sequence-form manifest has no hashes to verify");
    };

    let mut verified = 0usize;
    let mut mismatched = Vec::new();
    for (filename, record) in records {
        let Some(expected) = record.hash.as_deref() else {
            continue;
        };
        let bytes = match std::fs::read(docs_dir.join(filename)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %filename, error = %e, "cannot read document for hash verification");
                continue;
            }
        };
        verified += 1;
        let actual = format!("{:x}", Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            mismatched.push(format!("{filename} (manifest {expected}, disk {actual})"));
        }
    }

    let drift = Drift::new(verified, mismatched.len());
    if mismatched.is_empty() {
        return CheckReport::pass(CONTENT_HASHES, format!("{verified} file hashes match the manifest"))
            .with_drift(drift);
    }
    CheckReport::warn(
        CONTENT_HASHES,
        format!("{} of {verified} files differ from their recorded hash", mismatched.len()),
    )
    .with_drift(drift)
    .with_samples(mismatched)
}
