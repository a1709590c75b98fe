//! # Dossier
//!
//! Indexing and search for a personnel archive stored as a directory tree.
//!
//! Each person has a folder named `<id><name>` holding PDFs named by
//! classification code (`4-1-1.pdf`). A catalog folder beside them holds one
//! spreadsheet per person describing every file. Dossier scans the tree into
//! a SQLite index, answers name / id / category searches, and attaches the
//! matching spreadsheet row to every hit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Import root │──▶│    Scan     │──▶│  SQLite  │
//! │  (folders)  │   │ walk + parse│   │  index   │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!        ┌──────────┐  ┌───────────────────┤
//!        │ Catalog  │  ▼                   ▼
//!        │  (xlsx)  │─▶┌──────────┐  ┌──────────┐
//!        └──────────┘  │   CLI    │  │   HTTP   │
//!                      └──────────┘  └──────────┘
//! ```
//!
//! Domain rules (taxonomy, naming, sheet resolution, the query engine) live
//! in the I/O-free `dossier-core` crate. This crate supplies the filesystem,
//! spreadsheet, database and HTTP bindings.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`scan`] | Parallel archive walk |
//! | [`sqlite_index`] | Persistent index store |
//! | [`xlsx`] | Minimal `.xlsx` reader |
//! | [`metadata`] | Spreadsheet lookup with mtime cache |
//! | [`ingest`] | `import` and `prune` commands |
//! | [`search`] | `search` command |
//! | [`categories`] | `categories` command |
//! | [`catalog`] | `catalog` command |
//! | [`stats`] | `stats` command |
//! | [`progress`] | Scan progress reporting |
//! | [`server`] | JSON HTTP server |

pub mod catalog;
pub mod categories;
pub mod config;
pub mod db;
pub mod ingest;
pub mod metadata;
pub mod migrate;
pub mod progress;
pub mod scan;
pub mod search;
pub mod server;
pub mod sqlite_index;
pub mod stats;
pub mod xlsx;
