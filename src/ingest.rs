//! `dossier import`: scan an import root and publish the new index.
//!
//! The scan runs to completion before anything is written; the publish is a
//! single transaction. A cancelled or failed scan leaves the previous index
//! in place.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use dossier_core::store::IndexStore;
use dossier_core::ScanError;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::progress::ProgressMode;
use crate::scan::{scan_archive, ScanOptions, ScanReport};
use crate::sqlite_index::SqliteIndex;

/// Root for an import: the argument, else `[archive] root`, else the root
/// of the previous import.
pub async fn resolve_import_root(
    config: &Config,
    index: &SqliteIndex,
    explicit: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root.to_path_buf());
    }
    if let Some(root) = &config.archive.root {
        return Ok(root.clone());
    }
    if let Some(scan) = index.last_scan().await? {
        return Ok(scan.root);
    }
    bail!("No import root given. Pass one as an argument or set [archive] root in the config.")
}

/// Scan `root` and, unless `dry_run`, publish the result.
pub async fn import(
    config: &Config,
    index: &SqliteIndex,
    root: &Path,
    dry_run: bool,
    progress: ProgressMode,
    cancel: &CancellationToken,
) -> Result<ScanReport> {
    let options = ScanOptions::new(config, root)?;
    let reporter = progress.reporter();

    let report = match scan_archive(&options, reporter.as_ref(), cancel).await {
        Ok(report) => report,
        Err(ScanError::Cancelled) => bail!("import cancelled; index unchanged"),
        Err(e) => return Err(e.into()),
    };

    if !dry_run {
        index.publish(&report.snapshot, &report.warnings).await?;
    }
    Ok(report)
}

pub async fn run_import(
    config: &Config,
    root: Option<PathBuf>,
    dry_run: bool,
    progress: ProgressMode,
    cancel: CancellationToken,
) -> Result<()> {
    let index = SqliteIndex::connect(config).await?;
    let root = resolve_import_root(config, &index, root.as_deref()).await?;

    let result = import(config, &index, &root, dry_run, progress, &cancel).await;
    index.close().await;
    let report = result?;

    let header = if dry_run { " (dry-run)" } else { "" };
    println!("import {}{}", root.display(), header);
    println!("  persons:  {}", report.snapshot.persons().len());
    println!("  files:    {}", report.snapshot.files().len());
    println!("  warnings: {}", report.warnings.len());
    for w in &report.warnings {
        println!("    {}: {}", w.path.display(), w.message);
    }
    if !dry_run {
        println!("ok");
    }

    Ok(())
}

pub async fn run_prune(config: &Config) -> Result<()> {
    let index = SqliteIndex::connect(config).await?;
    let removed = index.prune().await?;
    index.close().await;
    println!("pruned {} missing files", removed);
    Ok(())
}
