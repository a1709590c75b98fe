//! Name / id search over an [`IndexSnapshot`].
//!
//! A request moves through these stages:
//!
//! ```text
//! Idle → Validating ─┬─▶ Disambiguating            (terminal)
//!                    └─▶ Filtering → EnrichingMetadata → Done
//! ```
//!
//! 1. **Validating**: at least one of name / id must be non-blank, otherwise
//!    [`QueryError::InvalidQuery`]. The full index is never dumped.
//! 2. **Disambiguating**: with only a name, if the files carrying that name
//!    belong to more than one person id, the request ends with
//!    [`SearchOutcome::DuplicateName`]. The caller re-issues with an id.
//! 3. **Filtering**: exact equality on name and/or id, `.pdf` only, and the
//!    optional category. A category that has sub-categories yields no files.
//! 4. **EnrichingMetadata**: every surviving file is looked up through a
//!    [`MetadataSource`], with bounded concurrency and stable order. A failed
//!    lookup leaves the file in the results with the error attached.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::{MetadataError, QueryError};
use crate::models::{ArchiveFile, IndexSnapshot, MetadataRow};
use crate::naming::{code_components, has_pdf_extension};
use crate::taxonomy::{CategoryNode, Taxonomy};

/// Default number of metadata lookups in flight per request.
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 4;

/// What the operator asked for.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub id: Option<String>,
    pub category: Option<CategoryNode>,
}

impl SearchQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn by_name_and_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            id: Some(id.into()),
            category: None,
        }
    }

    pub fn with_category(mut self, node: CategoryNode) -> Self {
        self.category = Some(node);
        self
    }

    fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    fn id(&self) -> Option<&str> {
        non_blank(self.id.as_deref())
    }

    /// The id to filter on. A supplied id filters even when empty, since
    /// directories without leading digits carry the empty id.
    fn id_filter(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim)
    }

    /// At least one of name and id must be non-blank.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.name().is_none() && self.id().is_none() {
            return Err(QueryError::InvalidQuery);
        }
        Ok(())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Everything one search request needs besides the index itself.
#[derive(Debug, Clone)]
pub struct SearchSession {
    /// Root whose catalog folder holds the per-person spreadsheets.
    pub import_root: PathBuf,
    pub query: SearchQuery,
}

/// One person sharing the searched name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Candidate {
    pub person_id: String,
    pub person_name: String,
}

/// A matched file and whatever metadata could be attached to it.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file: ArchiveFile,
    pub metadata: Option<MetadataRow>,
    pub warning: Option<MetadataError>,
}

impl SearchHit {
    pub fn material_name(&self) -> &str {
        self.metadata.as_ref().map(|m| m.material_name.as_str()).unwrap_or("")
    }

    pub fn date(&self) -> &str {
        self.metadata.as_ref().map(|m| m.date.as_str()).unwrap_or("")
    }

    pub fn page_count(&self) -> &str {
        self.metadata.as_ref().map(|m| m.page_count.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// Matches in file-name order.
    Hits { hits: Vec<SearchHit> },
    /// The name belongs to several people; supply an id.
    DuplicateName {
        name: String,
        candidates: Vec<Candidate>,
    },
}

impl SearchOutcome {
    /// Number of hits carrying a metadata warning.
    pub fn warning_count(&self) -> usize {
        match self {
            SearchOutcome::Hits { hits } => hits.iter().filter(|h| h.warning.is_some()).count(),
            SearchOutcome::DuplicateName { .. } => 0,
        }
    }
}

/// Source of per-file spreadsheet metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn lookup(
        &self,
        import_root: &Path,
        person_id: &str,
        person_name: &str,
        code: &str,
    ) -> Result<MetadataRow, MetadataError>;
}

/// Result of validation and filtering, before enrichment.
#[derive(Debug, Clone)]
pub enum QueryPlan {
    Disambiguate {
        name: String,
        candidates: Vec<Candidate>,
    },
    Files(Vec<ArchiveFile>),
}

/// Stateless search engine. All per-request state lives in [`SearchSession`].
#[derive(Debug, Clone)]
pub struct QueryEngine {
    taxonomy: Taxonomy,
    concurrency: usize,
}

impl QueryEngine {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self {
            taxonomy,
            concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Validate, disambiguate, and filter. No metadata is read.
    pub fn plan(&self, snapshot: &IndexSnapshot, query: &SearchQuery) -> Result<QueryPlan, QueryError> {
        query.validate()?;
        let name = query.name();
        let id = query.id_filter();

        if let (Some(name), None) = (name, id) {
            let candidates = candidates_for_name(snapshot, name);
            if candidates.len() > 1 {
                return Ok(QueryPlan::Disambiguate {
                    name: name.to_string(),
                    candidates,
                });
            }
        }

        if let Some(node) = &query.category {
            if self.taxonomy.has_children(node) {
                return Ok(QueryPlan::Files(Vec::new()));
            }
        }

        let files = snapshot
            .files()
            .iter()
            .filter(|f| name.map_or(true, |n| f.person_name.trim() == n))
            .filter(|f| id.map_or(true, |i| f.person_id == i))
            .filter(|f| has_pdf_extension(&f.file_name))
            .filter(|f| {
                query
                    .category
                    .as_ref()
                    .map_or(true, |node| category_matches(node, &f.classification_code))
            })
            .cloned()
            .collect();

        Ok(QueryPlan::Files(files))
    }

    /// Run a full search, enriching every matched file with metadata.
    pub async fn search<M>(
        &self,
        snapshot: &IndexSnapshot,
        session: &SearchSession,
        source: &M,
    ) -> Result<SearchOutcome, QueryError>
    where
        M: MetadataSource + ?Sized,
    {
        let files = match self.plan(snapshot, &session.query)? {
            QueryPlan::Disambiguate { name, candidates } => {
                return Ok(SearchOutcome::DuplicateName { name, candidates });
            }
            QueryPlan::Files(files) => files,
        };

        let root = session.import_root.as_path();
        let hits: Vec<SearchHit> = stream::iter(files)
            .map(|file| async move {
                let result = source
                    .lookup(
                        root,
                        &file.person_id,
                        &file.person_name,
                        &file.classification_code,
                    )
                    .await;
                match result {
                    Ok(row) => SearchHit {
                        file,
                        metadata: Some(row),
                        warning: None,
                    },
                    Err(e) => SearchHit {
                        file,
                        metadata: None,
                        warning: Some(e),
                    },
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        Ok(SearchOutcome::Hits { hits })
    }
}

/// Distinct people carrying exactly this name, ordered by id.
fn candidates_for_name(snapshot: &IndexSnapshot, name: &str) -> Vec<Candidate> {
    let set: BTreeSet<Candidate> = snapshot
        .files()
        .iter()
        .filter(|f| f.person_name.trim() == name)
        .map(|f| Candidate {
            person_id: f.person_id.clone(),
            person_name: f.person_name.clone(),
        })
        .collect();
    set.into_iter().collect()
}

/// Whether a file code belongs to a leaf category.
///
/// Compares leading digit groups, so the dash form (`"4-1-3"`) and the dot
/// form (`"4.1.3"`) both match node `4-1`, and node `1` never matches `10-1`.
pub fn category_matches(node: &CategoryNode, code: &str) -> bool {
    let parts = code_components(code);
    let main = node.main_code.to_string();
    if parts.first() != Some(&main.as_str()) {
        return false;
    }
    match node.sub_code {
        Some(sub) => parts.get(1) == Some(&sub.to_string().as_str()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn file(id: &str, name: &str, code: &str) -> ArchiveFile {
        let dir = format!("{}{}", id, name);
        ArchiveFile {
            person_id: id.into(),
            person_name: name.into(),
            path: PathBuf::from(format!("/import/{}/{}.pdf", dir, code)),
            file_name: format!("{}.pdf", code),
            classification_code: code.into(),
            dir_name: dir,
        }
    }

    fn snapshot(files: Vec<ArchiveFile>) -> IndexSnapshot {
        IndexSnapshot::new(files, vec![])
    }

    fn session(query: SearchQuery) -> SearchSession {
        SearchSession {
            import_root: PathBuf::from("/import"),
            query,
        }
    }

    /// Serves rows keyed by `"<id><name>:<code>"`.
    struct FixedRows {
        rows: HashMap<String, MetadataRow>,
        calls: AtomicUsize,
    }

    impl FixedRows {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            let rows = entries
                .iter()
                .map(|(key, code, material)| {
                    (
                        key.to_string(),
                        MetadataRow {
                            classification_code: code.to_string(),
                            material_name: material.to_string(),
                            date: "2020-1-1".into(),
                            page_count: "2".into(),
                        },
                    )
                })
                .collect();
            Self {
                rows,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetadataSource for FixedRows {
        async fn lookup(
            &self,
            import_root: &Path,
            person_id: &str,
            person_name: &str,
            code: &str,
        ) -> Result<MetadataRow, MetadataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = format!("{}{}:{}", person_id, person_name, code);
            self.rows.get(&key).cloned().ok_or_else(|| {
                MetadataError::SpreadsheetNotFound {
                    expected: format!("{}{}.xlsx", person_id, person_name),
                    catalog_dir: import_root.join("目录"),
                }
            })
        }
    }

    fn zhang_san_index() -> IndexSnapshot {
        snapshot(vec![
            file("007", "张三", "4-1-1"),
            file("008", "张三", "1-1"),
            file("009", "李四", "1-1"),
        ])
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let source = FixedRows::new(&[]);
        let err = engine
            .search(&zhang_san_index(), &session(SearchQuery::default()), &source)
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::InvalidQuery);

        let blank = SearchQuery {
            name: Some("  ".into()),
            id: Some(String::new()),
            category: None,
        };
        assert!(engine.plan(&zhang_san_index(), &blank).is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shared_name_requires_disambiguation() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let source = FixedRows::new(&[]);
        let outcome = engine
            .search(&zhang_san_index(), &session(SearchQuery::by_name("张三")), &source)
            .await
            .unwrap();

        match outcome {
            SearchOutcome::DuplicateName { name, candidates } => {
                assert_eq!(name, "张三");
                let ids: Vec<&str> = candidates.iter().map(|c| c.person_id.as_str()).collect();
                assert_eq!(ids, vec!["007", "008"]);
            }
            other => panic!("expected DuplicateName, got {:?}", other),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn name_and_id_with_sub_category() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let mut files = zhang_san_index().files().to_vec();
        files.push(file("007", "张三", "4-2-1"));
        files.push(file("007", "张三", "1-1"));
        let index = snapshot(files);

        let node = engine.taxonomy().by_code("4-1").unwrap().clone();
        let source = FixedRows::new(&[("007张三:4-1-1", "4-1-1", "学士学位证书")]);
        let outcome = engine
            .search(
                &index,
                &session(SearchQuery::by_name_and_id("张三", "007").with_category(node)),
                &source,
            )
            .await
            .unwrap();

        let SearchOutcome::Hits { hits } = outcome else {
            panic!("expected hits");
        };
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file.classification_code, "4-1-1");
        assert_eq!(hits[0].material_name(), "学士学位证书");
        assert!(hits[0].warning.is_none());
    }

    #[tokio::test]
    async fn missing_metadata_keeps_the_file() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let source = FixedRows::new(&[]);
        let outcome = engine
            .search(
                &zhang_san_index(),
                &session(SearchQuery::by_name_and_id("张三", "008")),
                &source,
            )
            .await
            .unwrap();

        assert_eq!(outcome.warning_count(), 1);
        let SearchOutcome::Hits { hits } = outcome else {
            panic!("expected hits");
        };
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].material_name(), "");
        assert_eq!(hits[0].date(), "");
        assert_eq!(hits[0].page_count(), "");
        assert_eq!(
            hits[0].warning.as_ref().map(MetadataError::kind),
            Some("spreadsheet_not_found")
        );
    }

    #[test]
    fn parent_category_yields_nothing() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let mut files = vec![];
        for code in ["4-1-1", "4-2-1", "4-3-1", "4-4-1", "9-1-1"] {
            files.push(file("007", "张三", code));
        }
        let index = snapshot(files);

        for root in ["4", "9"] {
            let node = engine.taxonomy().by_code(root).unwrap().clone();
            let plan = engine
                .plan(&index, &SearchQuery::by_name("张三").with_category(node))
                .unwrap();
            match plan {
                QueryPlan::Files(files) => assert!(files.is_empty()),
                other => panic!("unexpected plan {:?}", other),
            }
        }
    }

    #[test]
    fn id_only_query_matches_every_name_with_that_id() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let query = SearchQuery {
            id: Some("009".into()),
            ..SearchQuery::default()
        };
        let QueryPlan::Files(files) = engine.plan(&zhang_san_index(), &query).unwrap() else {
            panic!("expected files");
        };
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].person_name, "李四");
    }

    #[test]
    fn empty_id_candidate_can_be_selected() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let index = snapshot(vec![file("", "张三", "1-1"), file("007", "张三", "4-1-1")]);

        let QueryPlan::Disambiguate { candidates, .. } =
            engine.plan(&index, &SearchQuery::by_name("张三")).unwrap()
        else {
            panic!("expected disambiguation");
        };
        assert_eq!(candidates[0].person_id, "");

        let QueryPlan::Files(files) = engine
            .plan(&index, &SearchQuery::by_name_and_id("张三", ""))
            .unwrap()
        else {
            panic!("expected files");
        };
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].classification_code, "1-1");
    }

    #[test]
    fn blank_id_alone_is_still_invalid() {
        let query = SearchQuery {
            id: Some("  ".into()),
            ..SearchQuery::default()
        };
        assert!(matches!(query.validate(), Err(QueryError::InvalidQuery)));
        assert!(SearchQuery::by_name("张三").validate().is_ok());
    }

    #[test]
    fn padded_directory_name_matches_trimmed_query() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let index = snapshot(vec![file("", " 赵六", "7-1")]);
        let QueryPlan::Files(files) = engine
            .plan(&index, &SearchQuery::by_name("赵六"))
            .unwrap()
        else {
            panic!("expected files");
        };
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn single_person_name_skips_disambiguation() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let QueryPlan::Files(files) = engine
            .plan(&zhang_san_index(), &SearchQuery::by_name("李四"))
            .unwrap()
        else {
            panic!("expected files");
        };
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn matching_is_exact_not_substring() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let QueryPlan::Files(files) = engine
            .plan(&zhang_san_index(), &SearchQuery::by_name("张"))
            .unwrap()
        else {
            panic!("expected files");
        };
        assert!(files.is_empty());
    }

    #[test]
    fn non_pdf_files_are_filtered() {
        let engine = QueryEngine::new(Taxonomy::builtin());
        let mut doc = file("009", "李四", "2-1");
        doc.file_name = "2-1.docx".into();
        let index = snapshot(vec![doc, file("009", "李四", "1-1")]);
        let QueryPlan::Files(files) = engine.plan(&index, &SearchQuery::by_name("李四")).unwrap()
        else {
            panic!("expected files");
        };
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "1-1.pdf");
    }

    #[test]
    fn category_matching_rules() {
        let t = Taxonomy::builtin();
        let sub = t.by_code("4-1").unwrap();
        assert!(category_matches(sub, "4-1-3"));
        assert!(category_matches(sub, "4.1.3"));
        assert!(!category_matches(sub, "4-12-1"));
        assert!(!category_matches(sub, "4-2-1"));

        let leaf_root = t.by_code("1").unwrap();
        assert!(category_matches(leaf_root, "1-3"));
        assert!(!category_matches(leaf_root, "10-1"));
        assert!(category_matches(t.by_code("10").unwrap(), "10-1"));
    }

    #[tokio::test]
    async fn results_keep_file_name_order() {
        let engine = QueryEngine::new(Taxonomy::builtin()).with_concurrency(3);
        let index = snapshot(vec![
            file("1", "甲", "7-2"),
            file("1", "甲", "1-1"),
            file("1", "甲", "3-1"),
            file("1", "甲", "10-1"),
        ]);
        let source = FixedRows::new(&[("1甲:3-1", "3-1", "考核表")]);
        let SearchOutcome::Hits { hits } = engine
            .search(&index, &session(SearchQuery::by_name("甲")), &source)
            .await
            .unwrap()
        else {
            panic!("expected hits");
        };
        let names: Vec<&str> = hits.iter().map(|h| h.file.file_name.as_str()).collect();
        assert_eq!(names, vec!["1-1.pdf", "10-1.pdf", "3-1.pdf", "7-2.pdf"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }
}
