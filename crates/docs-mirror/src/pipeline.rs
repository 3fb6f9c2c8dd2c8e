/// Validation run over one mirror.
///
/// Loads every artifact once into a read-only [`Snapshot`], then runs the consistency,
/// search-index and link check groups concurrently on the blocking pool. An artifact
/// that fails to load turns each check needing it into a failed report; the other
/// checks still run.
use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use mirror_common::error::CommonError;
use mirror_common::layout::{list_documents, MirrorLayout};
use mirror_common::manifest::{BrokenPaths, DocsManifest, PathsManifest};

use crate::config::Config;
use crate::consistency::{
    check_cleaning_provenance, check_content_hashes, check_deprecated_paths, check_docs_manifest_fields,
    check_docs_manifest_files, check_duplicates, check_file_counts, check_filename_collisions,
    check_metadata_accuracy, check_orphans, CLEANING_PROVENANCE, CONTENT_HASHES, DEPRECATED_PATHS,
    DOCS_MANIFEST_FIELDS, DOCS_MANIFEST_FILES, DUPLICATE_PATHS, FILENAME_COLLISIONS, FILE_COUNTS,
    METADATA_ACCURACY, ORPHAN_PATHS,
};
use crate::error::AppError;
use crate::links::{self, LinkCorpus};
use crate::model::{CheckReport, RunSummary};
use crate::search;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Also compare file contents against the recorded hashes.
    pub verify_hashes: bool,
}

/// Every input artifact of a run, loaded once.
#[derive(Debug)]
pub struct Snapshot {
    pub paths: Result<PathsManifest, CommonError>,
    pub docs: Result<DocsManifest, CommonError>,
    pub broken: Result<Option<BrokenPaths>, CommonError>,
    pub files_on_disk: Result<BTreeSet<String>, CommonError>,
}

impl Snapshot {
    pub fn load(layout: &MirrorLayout) -> Self {
        let snapshot = Self {
            paths: PathsManifest::load(&layout.paths_manifest())
                .inspect_err(|e| warn!(error = %e, "paths manifest unavailable")),
            docs: DocsManifest::load(&layout.docs_manifest())
                .inspect_err(|e| warn!(error = %e, "docs manifest unavailable")),
            broken: BrokenPaths::load_optional(&layout.broken_paths())
                .inspect_err(|e| warn!(error = %e, "broken-path categorization unreadable")),
            files_on_disk: list_documents(&layout.docs_dir())
                .inspect_err(|e| warn!(error = %e, "cannot list documents")),
        };
        if let Ok(files) = &snapshot.files_on_disk {
            info!(documents = files.len(), "listed documents on disk");
        }
        snapshot
    }
}

/// Run `check` against a loaded artifact, or report it unavailable.
fn with<T>(
    check: &'static str,
    artifact: &Result<T, CommonError>,
    run: impl FnOnce(&T) -> CheckReport,
) -> CheckReport {
    match artifact {
        Ok(value) => run(value),
        Err(e) => CheckReport::unavailable(check, e),
    }
}

type CheckGroup = fn(&Config, &Snapshot, RunOptions) -> Vec<CheckReport>;

fn consistency_checks(config: &Config, snap: &Snapshot, options: RunOptions) -> Vec<CheckReport> {
    let thresholds = &config.thresholds;
    let mut reports = vec![
        with(DEPRECATED_PATHS, &snap.paths, |paths| {
            with(DEPRECATED_PATHS, &snap.broken, |broken| {
                check_deprecated_paths(paths, broken.as_ref())
            })
        }),
        with(ORPHAN_PATHS, &snap.paths, |paths| {
            with(ORPHAN_PATHS, &snap.files_on_disk, |files| {
                check_orphans(paths, files, thresholds)
            })
        }),
        with(METADATA_ACCURACY, &snap.paths, check_metadata_accuracy),
        with(DUPLICATE_PATHS, &snap.paths, check_duplicates),
        with(CLEANING_PROVENANCE, &snap.paths, check_cleaning_provenance),
        with(FILENAME_COLLISIONS, &snap.paths, check_filename_collisions),
        with(DOCS_MANIFEST_FILES, &snap.docs, |docs| {
            with(DOCS_MANIFEST_FILES, &snap.files_on_disk, |files| {
                check_docs_manifest_files(docs, files)
            })
        }),
        with(DOCS_MANIFEST_FIELDS, &snap.docs, |docs| {
            check_docs_manifest_fields(docs, &config.local_files)
        }),
        with(FILE_COUNTS, &snap.docs, |docs| {
            with(FILE_COUNTS, &snap.files_on_disk, |files| {
                check_file_counts(docs, files, snap.paths.as_ref().ok(), thresholds)
            })
        }),
    ];
    if options.verify_hashes {
        reports.push(with(CONTENT_HASHES, &snap.docs, |docs| {
            check_content_hashes(&config.layout.docs_dir(), docs)
        }));
    }
    reports
}

fn index_checks(config: &Config, snap: &Snapshot, _options: RunOptions) -> Vec<CheckReport> {
    vec![with(search::SEARCH_INDEX, &snap.docs, |docs| {
        search::check_search_index(&config.layout.search_index(), docs)
    })]
}

fn link_checks(config: &Config, snap: &Snapshot, _options: RunOptions) -> Vec<CheckReport> {
    let files = match &snap.files_on_disk {
        Ok(files) => files,
        Err(e) => {
            return [
                links::INTERNAL_LINKS,
                links::FRAGMENT_FORMAT,
                links::LINK_TEXT,
                links::DESCRIPTIVE_LINK_TEXT,
            ]
            .into_iter()
            .map(|check| CheckReport::unavailable(check, e))
            .collect();
        }
    };
    let corpus = LinkCorpus::load(&config.layout.docs_dir(), files);

    vec![
        with(links::INTERNAL_LINKS, &snap.paths, |paths| {
            links::check_internal_links(&corpus, &config.links, paths, &config.thresholds)
        }),
        links::check_fragments(&corpus, &config.links),
        links::check_link_text(&corpus),
        links::check_descriptive_text(&corpus, &config.thresholds),
    ]
}

/// Run every check against the mirror described by `config`.
pub async fn run(config: Arc<Config>, options: RunOptions) -> Result<RunSummary, AppError> {
    let snapshot = {
        let config = Arc::clone(&config);
        tokio::task::spawn_blocking(move || Snapshot::load(&config.layout))
            .await
            .map_err(|e| AppError::Task(e.to_string()))?
    };
    let snapshot = Arc::new(snapshot);

    let groups: [(&'static str, CheckGroup); 3] = [
        ("consistency", consistency_checks),
        ("search_index", index_checks),
        ("links", link_checks),
    ];
    let handles = groups.into_iter().map(|(name, group)| {
        let config = Arc::clone(&config);
        let snapshot = Arc::clone(&snapshot);
        tokio::task::spawn_blocking(move || {
            let reports = group(&config, &snapshot, options);
            debug!(group = name, reports = reports.len(), "check group finished");
            reports
        })
    });

    let mut reports = Vec::new();
    for result in join_all(handles).await {
        reports.extend(result.map_err(|e| AppError::Task(e.to_string()))?);
    }

    let summary = RunSummary::new(reports);
    info!(
        checks = summary.reports.len(),
        failures = summary.failures().count(),
        passed = summary.passed,
        "validation finished"
    );
    Ok(summary)
}
