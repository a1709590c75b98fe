//! SQLite-backed [`IndexStore`].
//!
//! A publish replaces every person and file row in one transaction and
//! appends a row to `scans`, so readers see the previous index or the new
//! one and never a mix. The root of the most recent scan doubles as the
//! default import root for searches.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use dossier_core::store::IndexStore;
use dossier_core::{ArchiveFile, IndexSnapshot, PersonRecord, ScanWarning};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::config::Config;
use crate::db;

/// Summary of the most recent import.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub id: i64,
    pub root: PathBuf,
    pub scanned_at: i64,
    pub person_count: i64,
    pub file_count: i64,
    pub warning_count: i64,
}

#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn last_scan(&self) -> Result<Option<ScanRecord>> {
        let row = sqlx::query(
            "SELECT id, root, scanned_at, person_count, file_count, warning_count \
             FROM scans ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ScanRecord {
            id: r.get("id"),
            root: PathBuf::from(r.get::<String, _>("root")),
            scanned_at: r.get("scanned_at"),
            person_count: r.get("person_count"),
            file_count: r.get("file_count"),
            warning_count: r.get("warning_count"),
        }))
    }

    /// Warnings recorded by the most recent scan.
    pub async fn last_warnings(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT path, message FROM scan_warnings \
             WHERE scan_id = (SELECT MAX(id) FROM scans) ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("path"), r.get::<String, _>("message")))
            .collect())
    }

    /// Remove rows whose file or person directory no longer exists.
    /// Returns the number of files removed.
    pub async fn prune(&self) -> Result<u64> {
        let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM archive_files")
            .fetch_all(&self.pool)
            .await?;
        let dirs: Vec<String> = sqlx::query_scalar("SELECT directory_path FROM persons")
            .fetch_all(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for path in paths.iter().filter(|p| !std::path::Path::new(p).exists()) {
            removed += sqlx::query("DELETE FROM archive_files WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        for dir in dirs.iter().filter(|d| !std::path::Path::new(d).is_dir()) {
            sqlx::query("DELETE FROM persons WHERE directory_path = ?")
                .bind(dir)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(removed, "pruned missing files");
        Ok(removed)
    }

    /// Indexed file count per root category, keyed by main code.
    pub async fn files_per_main_code(&self) -> Result<Vec<(u8, i64)>> {
        let codes: Vec<String> = sqlx::query_scalar("SELECT classification_code FROM archive_files")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = [0i64; 11];
        for code in &codes {
            let main = dossier_core::naming::code_components(code)
                .first()
                .and_then(|m| m.parse::<usize>().ok());
            if let Some(m @ 1..=10) = main {
                counts[m] += 1;
            } else {
                counts[0] += 1;
            }
        }
        Ok(counts
            .iter()
            .enumerate()
            .map(|(main, n)| (main as u8, *n))
            .collect())
    }
}

fn path_text(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}

#[async_trait]
impl IndexStore for SqliteIndex {
    async fn publish(&self, snapshot: &IndexSnapshot, warnings: &[ScanWarning]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM archive_files").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM persons").execute(&mut *tx).await?;

        for person in snapshot.persons() {
            sqlx::query(
                "INSERT INTO persons (directory_path, person_id, person_name) VALUES (?, ?, ?)",
            )
            .bind(path_text(&person.directory_path))
            .bind(&person.id)
            .bind(&person.name)
            .execute(&mut *tx)
            .await?;
        }

        for file in snapshot.files() {
            sqlx::query(
                r#"
                INSERT INTO archive_files
                    (path, person_id, person_name, file_name, classification_code, dir_name)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(path_text(&file.path))
            .bind(&file.person_id)
            .bind(&file.person_name)
            .bind(&file.file_name)
            .bind(&file.classification_code)
            .bind(&file.dir_name)
            .execute(&mut *tx)
            .await?;
        }

        let root = snapshot.root().map(path_text).unwrap_or_default();
        let scan_id = sqlx::query(
            r#"
            INSERT INTO scans (root, scanned_at, person_count, file_count, warning_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&root)
        .bind(chrono::Utc::now().timestamp())
        .bind(snapshot.persons().len() as i64)
        .bind(snapshot.files().len() as i64)
        .bind(warnings.len() as i64)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for w in warnings {
            sqlx::query("INSERT INTO scan_warnings (scan_id, path, kind, message) VALUES (?, ?, ?, ?)")
                .bind(scan_id)
                .bind(path_text(&w.path))
                .bind("io")
                .bind(&w.message)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(
            root = %root,
            persons = snapshot.persons().len(),
            files = snapshot.files().len(),
            warnings = warnings.len(),
            "index published"
        );
        Ok(())
    }

    async fn snapshot(&self) -> Result<IndexSnapshot> {
        let persons = sqlx::query("SELECT directory_path, person_id, person_name FROM persons")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| PersonRecord {
                id: r.get("person_id"),
                name: r.get("person_name"),
                directory_path: PathBuf::from(r.get::<String, _>("directory_path")),
            })
            .collect();

        let files = sqlx::query(
            "SELECT path, person_id, person_name, file_name, classification_code, dir_name \
             FROM archive_files",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| ArchiveFile {
            person_id: r.get("person_id"),
            person_name: r.get("person_name"),
            path: PathBuf::from(r.get::<String, _>("path")),
            file_name: r.get("file_name"),
            classification_code: r.get("classification_code"),
            dir_name: r.get("dir_name"),
        })
        .collect();

        let snapshot = IndexSnapshot::new(files, persons);
        Ok(match self.last_scan().await? {
            Some(scan) if !scan.root.as_os_str().is_empty() => snapshot.with_root(scan.root),
            _ => snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::models::ScanWarningKind;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir) -> SqliteIndex {
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("data/dossier.sqlite");
        let index = SqliteIndex::connect(&config).await.unwrap();
        crate::migrate::apply(index.pool()).await.unwrap();
        index
    }

    fn file(root: &std::path::Path, dir: &str, code: &str) -> ArchiveFile {
        let (id, name) = dossier_core::naming::parse_directory_name(dir);
        ArchiveFile {
            person_id: id,
            person_name: name,
            path: root.join(dir).join(format!("{}.pdf", code)),
            file_name: format!("{}.pdf", code),
            classification_code: code.into(),
            dir_name: dir.into(),
        }
    }

    #[tokio::test]
    async fn publish_replaces_previous_index() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp).await;
        let root = tmp.path().join("archive");

        let first = IndexSnapshot::new(
            vec![file(&root, "007张三", "1-1"), file(&root, "007张三", "4-1-1")],
            vec![],
        )
        .with_root(&root);
        index.publish(&first, &[]).await.unwrap();

        let second = IndexSnapshot::new(vec![file(&root, "008李四", "7-1")], vec![]).with_root(&root);
        let warning = ScanWarning {
            path: root.join("坏目录"),
            kind: ScanWarningKind::Io,
            message: "permission denied".into(),
        };
        index.publish(&second, &[warning]).await.unwrap();

        let loaded = index.snapshot().await.unwrap();
        assert_eq!(loaded.files().len(), 1);
        assert_eq!(loaded.files()[0].person_name, "李四");
        assert_eq!(loaded.root(), Some(root.as_path()));

        let scan = index.last_scan().await.unwrap().unwrap();
        assert_eq!(scan.file_count, 1);
        assert_eq!(scan.warning_count, 1);
        assert_eq!(index.last_warnings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_drops_missing_files() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp).await;
        let root = tmp.path().join("archive");
        std::fs::create_dir_all(root.join("007张三")).unwrap();
        std::fs::write(root.join("007张三/1-1.pdf"), b"%PDF").unwrap();

        let snapshot = IndexSnapshot::new(
            vec![file(&root, "007张三", "1-1"), file(&root, "007张三", "2-1")],
            vec![],
        );
        index.publish(&snapshot, &[]).await.unwrap();

        assert_eq!(index.prune().await.unwrap(), 1);
        let codes: Vec<String> = index
            .snapshot()
            .await
            .unwrap()
            .files()
            .iter()
            .map(|f| f.classification_code.clone())
            .collect();
        assert_eq!(codes, vec!["1-1"]);
    }

    #[tokio::test]
    async fn per_category_counts() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp).await;
        let root = tmp.path().to_path_buf();
        let snapshot = IndexSnapshot::new(
            vec![
                file(&root, "1甲", "1-1"),
                file(&root, "1甲", "10-2"),
                file(&root, "1甲", "4.1.1"),
                file(&root, "1甲", "扫描"),
            ],
            vec![],
        );
        index.publish(&snapshot, &[]).await.unwrap();
        let counts = index.files_per_main_code().await.unwrap();
        assert_eq!(counts[0], (0, 1));
        assert_eq!(counts[1], (1, 1));
        assert_eq!(counts[4], (4, 1));
        assert_eq!(counts[10], (10, 1));
    }
}
