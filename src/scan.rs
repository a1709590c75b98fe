//! Filesystem scan of an import root.
//!
//! Every top-level directory under the root is a person directory, except
//! hidden ones and the catalog folder. Person directories are walked in
//! parallel on the blocking pool, bounded by `scan.workers`; every `.pdf`
//! found at any depth below a person directory becomes an [`ArchiveFile`]
//! of that person.
//!
//! The result is a complete [`IndexSnapshot`]. Unreadable entries become
//! [`ScanWarning`]s and the walk continues. A cancelled scan returns
//! [`ScanError::Cancelled`] and its partial results are dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dossier_core::models::ScanWarningKind;
use dossier_core::naming::{
    has_pdf_extension, is_hidden, parse_classification_code, parse_directory_name,
};
use dossier_core::{ArchiveFile, IndexSnapshot, PersonRecord, ScanError, ScanWarning};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::progress::{ScanProgressEvent, ScanProgressReporter};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub catalog_dir: String,
    pub workers: usize,
    excludes: Arc<GlobSet>,
}

impl ScanOptions {
    pub fn new(config: &Config, root: &Path) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            catalog_dir: config.archive.catalog_dir.clone(),
            workers: config.scan.effective_workers(),
            excludes: Arc::new(build_globset(&config.scan.exclude_globs)?),
        })
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// A finished scan, ready to publish.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub snapshot: IndexSnapshot,
    pub warnings: Vec<ScanWarning>,
}

struct PersonOutcome {
    person: PersonRecord,
    files: Vec<ArchiveFile>,
    warnings: Vec<ScanWarning>,
}

fn io_warning(path: PathBuf, message: impl ToString) -> ScanWarning {
    ScanWarning {
        path,
        kind: ScanWarningKind::Io,
        message: message.to_string(),
    }
}

pub async fn scan_archive(
    options: &ScanOptions,
    progress: &dyn ScanProgressReporter,
    cancel: &CancellationToken,
) -> Result<ScanReport, ScanError> {
    let root = options.root.clone();
    if !root.is_dir() {
        return Err(ScanError::RootMissing(root));
    }
    let root_label = root.display().to_string();

    progress.report(ScanProgressEvent::Discovering {
        root: root_label.clone(),
    });
    let (person_dirs, mut warnings) = discover_person_dirs(options)?;
    let total = person_dirs.len() as u64;
    info!(root = %root_label, persons = total, workers = options.workers, "scanning import root");

    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut tasks = JoinSet::new();
    for dir in person_dirs {
        let semaphore = Arc::clone(&semaphore);
        let excludes = Arc::clone(&options.excludes);
        let token = cancel.clone();
        let root = root.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ScanError::Worker(e.to_string()))?;
            tokio::task::spawn_blocking(move || walk_person(&root, &dir, &excludes, &token))
                .await
                .map_err(|e| ScanError::Worker(e.to_string()))
        });
    }

    let mut persons = Vec::new();
    let mut files = Vec::new();
    let mut done = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                info!(root = %root_label, "scan cancelled");
                return Err(ScanError::Cancelled);
            }
            next = tasks.join_next() => match next {
                None => break,
                Some(Ok(Ok(outcome))) => {
                    done += 1;
                    debug!(
                        person = %outcome.person.name,
                        id = %outcome.person.id,
                        files = outcome.files.len(),
                        "person scanned"
                    );
                    persons.push(outcome.person);
                    files.extend(outcome.files);
                    warnings.extend(outcome.warnings);
                    progress.report(ScanProgressEvent::Scanning {
                        root: root_label.clone(),
                        n: done,
                        total,
                    });
                }
                Some(Ok(Err(e))) => return Err(e),
                Some(Err(join)) => return Err(ScanError::Worker(join.to_string())),
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    for w in &warnings {
        warn!(path = %w.path.display(), message = %w.message, "skipped unreadable entry");
    }
    warnings.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ScanReport {
        snapshot: IndexSnapshot::new(files, persons).with_root(root),
        warnings,
    })
}

/// Top-level person directories, sorted by name.
fn discover_person_dirs(options: &ScanOptions) -> Result<(Vec<PathBuf>, Vec<ScanWarning>), ScanError> {
    let entries = std::fs::read_dir(&options.root).map_err(|e| ScanError::Unreadable {
        path: options.root.clone(),
        message: e.to_string(),
    })?;

    let mut dirs = Vec::new();
    let mut warnings = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(io_warning(options.root.clone(), e));
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().to_string();
        if is_hidden(&name) || name == options.catalog_dir || options.excludes.is_match(&name) {
            continue;
        }
        match entry.file_type() {
            Ok(t) if t.is_dir() => dirs.push(entry.path()),
            Ok(_) => {}
            Err(e) => warnings.push(io_warning(entry.path(), e)),
        }
    }
    dirs.sort();
    Ok((dirs, warnings))
}

fn walk_person(
    root: &Path,
    dir: &Path,
    excludes: &GlobSet,
    cancel: &CancellationToken,
) -> PersonOutcome {
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (person_id, person_name) = parse_directory_name(&dir_name);

    let mut files = Vec::new();
    let mut warnings = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(&e.file_name().to_string_lossy()));

    for entry in walker {
        if cancel.is_cancelled() {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                warnings.push(io_warning(path, e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if excludes.is_match(relative) {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        if !has_pdf_extension(&file_name) {
            continue;
        }

        files.push(ArchiveFile {
            person_id: person_id.clone(),
            person_name: person_name.clone(),
            path: path.to_path_buf(),
            classification_code: parse_classification_code(&file_name),
            file_name,
            dir_name: dir_name.clone(),
        });
    }

    PersonOutcome {
        person: PersonRecord {
            id: person_id,
            name: person_name,
            directory_path: dir.to_path_buf(),
        },
        files,
        warnings,
    }
}
