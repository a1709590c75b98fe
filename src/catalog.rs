//! `dossier catalog`: dump a person's whole spreadsheet.

use std::path::PathBuf;

use anyhow::{bail, Result};
use dossier_core::store::IndexStore;

use crate::config::Config;
use crate::metadata::MetadataLookup;
use crate::search::metadata_root;
use crate::sqlite_index::SqliteIndex;

pub async fn run_catalog(
    config: &Config,
    id: &str,
    name: &str,
    root: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let index = SqliteIndex::connect(config).await?;
    let snapshot = index.snapshot().await?;
    index.close().await;

    let Some(import_root) = metadata_root(config, &snapshot, root.as_deref()) else {
        bail!("No import root known. Run `dossier import <ROOT>` first or pass --root.");
    };

    let lookup = MetadataLookup::from_config(config);
    let (id, name) = (id.to_string(), name.to_string());
    let sheets = tokio::task::spawn_blocking(move || lookup.catalog(&import_root, &id, &name)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&sheets)?);
        return Ok(());
    }

    for sheet in &sheets {
        println!("[{}]", sheet.sheet);
        if sheet.rows.is_empty() {
            println!("  (empty)");
        }
        for row in &sheet.rows {
            println!(
                "  {:<10} {}  {}  {}p",
                row.classification_code, row.material_name, row.date, row.page_count
            );
        }
    }
    Ok(())
}
