//! Core data types shared by the scanner, the index, and the query engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

/// A person directory found under the import root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonRecord {
    /// Leading digits of the directory name; empty when there are none.
    pub id: String,
    pub name: String,
    pub directory_path: PathBuf,
}

/// One indexed document.
///
/// `classification_code` is always `file_name` without its extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveFile {
    pub person_id: String,
    pub person_name: String,
    pub path: PathBuf,
    pub file_name: String,
    pub classification_code: String,
    /// Name of the person directory the file was found under.
    pub dir_name: String,
}

/// Descriptive metadata recovered from a person's spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MetadataRow {
    pub classification_code: String,
    pub material_name: String,
    /// Present parts of year/month/day joined with `-`; may be empty.
    pub date: String,
    /// `"0"` when the sheet leaves it blank.
    pub page_count: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanWarningKind {
    /// A directory entry could not be read. The walk skipped it.
    Io,
}

/// A per-entry problem met while scanning. The scan continues past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub kind: ScanWarningKind,
    pub message: String,
}

/// An immutable, fully built index.
///
/// Files are ordered by file name, then path. A new scan produces a new
/// snapshot; existing snapshots are never mutated, so clones are cheap
/// handles to shared data.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    root: Option<PathBuf>,
    files: Arc<[ArchiveFile]>,
    persons: Arc<[PersonRecord]>,
}

impl IndexSnapshot {
    /// Build a snapshot, establishing the canonical file order.
    pub fn new(mut files: Vec<ArchiveFile>, mut persons: Vec<PersonRecord>) -> Self {
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name).then(a.path.cmp(&b.path)));
        persons.sort_by(|a, b| a.directory_path.cmp(&b.directory_path));
        Self {
            root: None,
            files: files.into(),
            persons: persons.into(),
        }
    }

    /// Record the import root this snapshot was scanned from.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn files(&self) -> &[ArchiveFile] {
        &self.files
    }

    pub fn persons(&self) -> &[PersonRecord] {
        &self.persons
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for IndexSnapshot {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, path: &str) -> ArchiveFile {
        ArchiveFile {
            person_id: "1".into(),
            person_name: "甲".into(),
            path: PathBuf::from(path),
            file_name: name.into(),
            classification_code: name.trim_end_matches(".pdf").into(),
            dir_name: "1甲".into(),
        }
    }

    #[test]
    fn snapshot_orders_by_file_name_then_path() {
        let snap = IndexSnapshot::new(
            vec![
                file("4-1-2.pdf", "/b/4-1-2.pdf"),
                file("1-1.pdf", "/z/1-1.pdf"),
                file("1-1.pdf", "/a/1-1.pdf"),
            ],
            vec![],
        );
        let order: Vec<&str> = snap
            .files()
            .iter()
            .map(|f| f.path.to_str().unwrap())
            .collect();
        assert_eq!(order, vec!["/a/1-1.pdf", "/z/1-1.pdf", "/b/4-1-2.pdf"]);
    }

    #[test]
    fn clones_share_storage() {
        let snap = IndexSnapshot::new(vec![file("1-1.pdf", "/a/1-1.pdf")], vec![]);
        let other = snap.clone();
        assert!(std::ptr::eq(snap.files().as_ptr(), other.files().as_ptr()));
    }
}
