//! `dossier search`: name / id lookup with metadata enrichment.
//!
//! [`search_archive`] returns the structured [`SearchOutcome`] shared by the
//! CLI and the HTTP server; [`run_search`] prints it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use dossier_core::store::IndexStore;
use dossier_core::{
    IndexSnapshot, QueryEngine, QueryError, SearchOutcome, SearchQuery, SearchSession, Taxonomy,
    TaxonomyError,
};
use serde::Deserialize;

use crate::config::Config;
use crate::metadata::MetadataLookup;
use crate::sqlite_index::SqliteIndex;

/// A search as the operator phrases it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Code, label, or display label.
    #[serde(default)]
    pub category: Option<String>,
}

impl SearchRequest {
    /// Name / id check, run before the category is resolved.
    pub fn validate(&self) -> Result<(), QueryError> {
        SearchQuery {
            name: self.name.clone(),
            id: self.id.clone(),
            category: None,
        }
        .validate()
    }

    pub fn to_query(&self, taxonomy: &Taxonomy) -> Result<SearchQuery, TaxonomyError> {
        let category = match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => Some(taxonomy.lookup(c)?.clone()),
            _ => None,
        };
        Ok(SearchQuery {
            name: self.name.clone(),
            id: self.id.clone(),
            category,
        })
    }
}

pub fn engine_for(config: &Config) -> QueryEngine {
    QueryEngine::new(Taxonomy::builtin()).with_concurrency(config.lookup.concurrency)
}

/// Import root used for metadata: the explicit one, else the snapshot's,
/// else `[archive] root`.
pub fn metadata_root(config: &Config, snapshot: &IndexSnapshot, explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| snapshot.root().map(Path::to_path_buf))
        .or_else(|| config.archive.root.clone())
}

pub async fn search_archive(
    engine: &QueryEngine,
    snapshot: &IndexSnapshot,
    lookup: &MetadataLookup,
    import_root: PathBuf,
    request: &SearchRequest,
) -> Result<SearchOutcome> {
    request.validate()?;
    let query = request.to_query(engine.taxonomy())?;
    let session = SearchSession { import_root, query };
    Ok(engine.search(snapshot, &session, lookup).await?)
}

pub async fn run_search(
    config: &Config,
    request: SearchRequest,
    root: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    request.validate()?;
    let engine = engine_for(config);

    let index = SqliteIndex::connect(config).await?;
    let snapshot = index.snapshot().await?;
    index.close().await;

    let Some(import_root) = metadata_root(config, &snapshot, root.as_deref()) else {
        bail!("No import root known. Run `dossier import <ROOT>` first or pass --root.");
    };

    let lookup = MetadataLookup::from_config(config);
    let outcome = search_archive(&engine, &snapshot, &lookup, import_root, &request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        SearchOutcome::DuplicateName { name, candidates } => {
            println!(
                "{} people are named {}. Re-run with --id <ID>:",
                candidates.len(),
                name
            );
            for c in candidates {
                println!("  {:<10} {}", c.person_id, c.person_name);
            }
        }
        SearchOutcome::Hits { hits } if hits.is_empty() => {
            println!("No results.");
        }
        SearchOutcome::Hits { hits } => {
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. {}  [{}]  {}{}",
                    i + 1,
                    hit.file.file_name,
                    hit.file.classification_code,
                    hit.file.person_id,
                    hit.file.person_name
                );
                println!("    material: {}", hit.material_name());
                println!("    date:     {}", hit.date());
                println!("    pages:    {}", hit.page_count());
                println!("    path:     {}", hit.file.path.display());
                if let Some(w) = &hit.warning {
                    println!("    warning:  {}", w);
                }
            }
            println!();
            println!(
                "{} files, {} without metadata",
                hits.len(),
                outcome.warning_count()
            );
        }
    }

    Ok(())
}
