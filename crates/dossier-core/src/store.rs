//! Index storage abstraction.
//!
//! The [`IndexStore`] trait is the only way scans publish and queries read
//! the archive index. A scan builds a complete [`IndexSnapshot`] off to the
//! side and hands it to [`IndexStore::publish`]; readers call
//! [`IndexStore::snapshot`] and keep working against whatever snapshot they
//! got, even if a newer one is published meanwhile.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexSnapshot, ScanWarning};

/// Abstract storage backend for the archive index.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Replace the whole index with `snapshot`. Must be atomic: readers see
    /// either the previous index or the new one, never a mix.
    async fn publish(&self, snapshot: &IndexSnapshot, warnings: &[ScanWarning]) -> Result<()>;

    /// The current index.
    async fn snapshot(&self) -> Result<IndexSnapshot>;
}

/// In-memory [`IndexStore`], for tests and for the server's hot snapshot.
pub struct InMemoryIndex {
    current: RwLock<Arc<IndexSnapshot>>,
    warnings: RwLock<Vec<ScanWarning>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::default())),
            warnings: RwLock::new(Vec::new()),
        }
    }

    pub fn with_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            warnings: RwLock::new(Vec::new()),
        }
    }

    /// Warnings reported by the scan that produced the current snapshot.
    pub fn warnings(&self) -> Vec<ScanWarning> {
        self.warnings
            .read()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndex {
    async fn publish(&self, snapshot: &IndexSnapshot, warnings: &[ScanWarning]) -> Result<()> {
        let next = Arc::new(snapshot.clone());
        {
            let mut current = self
                .current
                .write()
                .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
            *current = next;
        }
        let mut stored = self
            .warnings
            .write()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        *stored = warnings.to_vec();
        Ok(())
    }

    async fn snapshot(&self) -> Result<IndexSnapshot> {
        let current = self
            .current
            .read()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        Ok((**current).clone())
    }
}
