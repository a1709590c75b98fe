//! # Dossier Core
//!
//! Shared, I/O-free logic for Dossier: the category taxonomy, filename
//! conventions, sheet resolution and row extraction, the index abstraction,
//! and the archive query engine.
//!
//! This crate performs no filesystem or database access. Spreadsheets reach
//! it as a [`sheet::SheetGrid`]; indexes reach it through the
//! [`store::IndexStore`] trait; metadata enrichment goes through
//! [`query::MetadataSource`].

pub mod error;
pub mod models;
pub mod naming;
pub mod query;
pub mod sheet;
pub mod store;
pub mod taxonomy;

pub use error::{MetadataError, QueryError, ScanError, TaxonomyError};
pub use models::{ArchiveFile, IndexSnapshot, MetadataRow, PersonRecord, ScanWarning};
pub use query::{
    Candidate, MetadataSource, QueryEngine, QueryPlan, SearchHit, SearchOutcome, SearchQuery,
    SearchSession,
};
pub use store::{InMemoryIndex, IndexStore};
pub use taxonomy::{CategoryNode, Taxonomy};
