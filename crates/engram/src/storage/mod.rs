//! Long-term memory storage
//!
//! `LongTermStore` is append-only: records can be added and searched by
//! similarity, never updated or deleted. Retention is unbounded.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::types::{MemoryRecord, SearchHit};

pub mod in_memory;
pub mod lance;
pub mod resilient;

pub use in_memory::InMemoryStore;
pub use lance::LanceStore;
pub use resilient::{ResilientStore, RetryPolicy};

/// Persistent, similarity-searchable collection of memory records.
///
/// Implementations must tolerate concurrent `add` and `search` calls.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    /// Embed and persist `record`.
    ///
    /// Either the record is searchable afterwards or the call fails with
    /// `ProviderUnavailable` and nothing was written.
    async fn add(&self, record: &MemoryRecord) -> Result<()>;

    /// Return at most `k` records ranked by similarity to `query`, best first.
    ///
    /// Order among equal scores is whatever the backend yields.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// Number of records held
    async fn count(&self) -> Result<usize>;
}

#[async_trait]
impl<S: LongTermStore + ?Sized> LongTermStore for Arc<S> {
    async fn add(&self, record: &MemoryRecord) -> Result<()> {
        (**self).add(record).await
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        (**self).search(query, k).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }
}
