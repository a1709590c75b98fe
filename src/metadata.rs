//! Spreadsheet-backed metadata lookup.
//!
//! Each person has one workbook in the catalog folder of the import root,
//! named `"<id><name>.xlsx"`. A lookup finds that workbook, picks the sheet
//! for the classification code, extracts the sheet's rows, and returns the
//! row whose column A matches the code.
//!
//! Extracted rows are cached per `(workbook, sheet)` and invalidated when the
//! workbook's modification time changes. Workbooks are read with blocking
//! I/O on tokio's blocking pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use dossier_core::naming::expected_spreadsheet_name;
use dossier_core::query::MetadataSource;
use dossier_core::sheet::{self, SheetGrid};
use dossier_core::{MetadataError, MetadataRow};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::xlsx::Workbook;

type CacheKey = (PathBuf, String);

struct CachedRows {
    modified: Option<SystemTime>,
    rows: Arc<Vec<MetadataRow>>,
}

struct Inner {
    catalog_dir: String,
    cache: Option<Mutex<HashMap<CacheKey, CachedRows>>>,
}

/// All data rows of one sheet, for the catalog view.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSheet {
    pub sheet: String,
    pub rows: Vec<MetadataRow>,
}

/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct MetadataLookup {
    inner: Arc<Inner>,
}

impl MetadataLookup {
    pub fn new(catalog_dir: impl Into<String>, cache: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog_dir: catalog_dir.into(),
                cache: cache.then(|| Mutex::new(HashMap::new())),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.archive.catalog_dir.clone(), config.lookup.cache)
    }

    pub fn catalog_path(&self, import_root: &Path) -> PathBuf {
        import_root.join(&self.inner.catalog_dir)
    }

    /// Locate the person's workbook. The file name must match exactly.
    pub fn spreadsheet_path(
        &self,
        import_root: &Path,
        person_id: &str,
        person_name: &str,
    ) -> Result<PathBuf, MetadataError> {
        let catalog = self.catalog_path(import_root);
        let expected = expected_spreadsheet_name(person_id, person_name);
        let not_found = || MetadataError::SpreadsheetNotFound {
            expected: expected.clone(),
            catalog_dir: catalog.clone(),
        };

        let entries = std::fs::read_dir(&catalog).map_err(|_| not_found())?;
        for entry in entries.flatten() {
            if entry.file_name().to_str() == Some(expected.as_str())
                && entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            {
                return Ok(entry.path());
            }
        }
        Err(not_found())
    }

    /// Synchronous lookup of one file's metadata row.
    pub fn lookup_blocking(
        &self,
        import_root: &Path,
        person_id: &str,
        person_name: &str,
        code: &str,
    ) -> Result<MetadataRow, MetadataError> {
        let path = match self.spreadsheet_path(import_root, person_id, person_name) {
            Ok(path) => path,
            Err(e) => {
                let gone = self
                    .catalog_path(import_root)
                    .join(expected_spreadsheet_name(person_id, person_name));
                self.forget(&gone);
                return Err(e);
            }
        };

        let sheet_name = sheet::resolve_sheet(code).ok_or_else(|| MetadataError::SheetNotRecognized {
            code: code.to_string(),
        })?;

        let rows = self.sheet_rows(&path, sheet_name, sheet::data_start_row(code))?;
        sheet::find_row(&rows, code)
            .cloned()
            .ok_or_else(|| MetadataError::RowNotFound {
                code: code.to_string(),
                sheet: sheet_name.to_string(),
            })
    }

    /// Every sheet of the person's workbook with its data rows, in tab order.
    pub fn catalog(
        &self,
        import_root: &Path,
        person_id: &str,
        person_name: &str,
    ) -> Result<Vec<CatalogSheet>, MetadataError> {
        let path = self.spreadsheet_path(import_root, person_id, person_name)?;
        let bytes = read_file(&path)?;
        let mut workbook = Workbook::open(&bytes).map_err(|e| unreadable(&path, e))?;

        let names: Vec<String> = workbook.sheet_names().iter().map(|s| s.to_string()).collect();
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let Some(grid) = workbook.read_sheet(&name).map_err(|e| unreadable(&path, e))? else {
                continue;
            };
            let rows = sheet::extract_rows(&grid, sheet::data_start_row_for_sheet(&name));
            sheets.push(CatalogSheet { sheet: name, rows });
        }
        Ok(sheets)
    }

    /// Drop cached rows of a workbook that is gone.
    fn forget(&self, path: &Path) {
        if let Some(cache) = &self.inner.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.retain(|(cached, _), _| cached != path);
            }
        }
    }

    #[cfg(test)]
    fn cached_sheets(&self) -> usize {
        self.inner
            .cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }

    fn sheet_rows(
        &self,
        path: &Path,
        sheet_name: &str,
        start_row: u32,
    ) -> Result<Arc<Vec<MetadataRow>>, MetadataError> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let key = (path.to_path_buf(), sheet_name.to_string());

        if let Some(cache) = &self.inner.cache {
            if let Ok(cache) = cache.lock() {
                if let Some(hit) = cache.get(&key) {
                    if hit.modified.is_some() && hit.modified == modified {
                        debug!(path = %path.display(), sheet = sheet_name, "metadata cache hit");
                        return Ok(Arc::clone(&hit.rows));
                    }
                }
            }
        }

        let grid = load_grid(path, sheet_name)?;
        let rows = Arc::new(sheet::extract_rows(&grid, start_row));

        if let Some(cache) = &self.inner.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.insert(
                    key,
                    CachedRows {
                        modified,
                        rows: Arc::clone(&rows),
                    },
                );
            }
        }

        Ok(rows)
    }
}

/// Read the named sheet, falling back to the first sheet when the workbook
/// lacks it.
fn load_grid(path: &Path, sheet_name: &str) -> Result<SheetGrid, MetadataError> {
    let bytes = read_file(path)?;
    let mut workbook = Workbook::open(&bytes).map_err(|e| unreadable(path, e))?;
    match workbook.read_sheet(sheet_name).map_err(|e| unreadable(path, e))? {
        Some(grid) => Ok(grid),
        None => {
            warn!(
                path = %path.display(),
                sheet = sheet_name,
                "sheet missing from workbook, reading the first sheet instead"
            );
            workbook.read_first_sheet().map_err(|e| unreadable(path, e))
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, MetadataError> {
    std::fs::read(path).map_err(|e| unreadable(path, e))
}

fn unreadable(path: &Path, e: impl std::fmt::Display) -> MetadataError {
    MetadataError::Unreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[async_trait]
impl MetadataSource for MetadataLookup {
    async fn lookup(
        &self,
        import_root: &Path,
        person_id: &str,
        person_name: &str,
        code: &str,
    ) -> Result<MetadataRow, MetadataError> {
        let this = self.clone();
        let root = import_root.to_path_buf();
        let (id, name, wanted) = (person_id.to_string(), person_name.to_string(), code.to_string());

        let outcome = tokio::task::spawn_blocking(move || this.lookup_blocking(&root, &id, &name, &wanted))
            .await
            .unwrap_or_else(|join| {
                Err(MetadataError::Unreadable {
                    path: self.catalog_path(import_root),
                    message: join.to_string(),
                })
            });

        if let Err(e) = &outcome {
            warn!(person_id, person_name, code, kind = e.kind(), error = %e, "metadata unavailable");
        }
        outcome
    }
}
