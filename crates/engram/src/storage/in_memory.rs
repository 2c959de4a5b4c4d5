//! Volatile long-term store with brute-force cosine ranking.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::{Embedder, cosine_similarity};
use crate::error::{EngramError, Result};
use crate::memory::types::{MemoryRecord, SearchHit};
use crate::storage::LongTermStore;

struct StoredRecord {
    record: MemoryRecord,
    embedding: Vec<f32>,
}

/// Keeps records and their embeddings in memory. Lost when dropped.
pub struct InMemoryStore<E> {
    embedder: E,
    records: RwLock<Vec<StoredRecord>>,
}

impl<E: Embedder> InMemoryStore<E> {
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every record, in insertion order
    pub async fn records(&self) -> Vec<MemoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .map(|stored| stored.record.clone())
            .collect()
    }
}

#[async_trait]
impl<E: Embedder> LongTermStore for InMemoryStore<E> {
    async fn add(&self, record: &MemoryRecord) -> Result<()> {
        let embedding = self.embedder.embed(&record.text).await?;
        if embedding.len() != self.embedder.dimension() {
            return Err(EngramError::InvalidConfiguration(format!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                self.embedder.dimension()
            )));
        }

        let mut records = self.records.write().await;
        if records.iter().any(|stored| stored.record.id == record.id) {
            tracing::debug!("Record {} already stored", record.id);
            return Ok(());
        }
        records.push(StoredRecord {
            record: record.clone(),
            embedding,
        });
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let records = self.records.read().await;

        let mut hits: Vec<SearchHit> = records
            .iter()
            .map(|stored| SearchHit {
                record: stored.record.clone(),
                score: cosine_similarity(&query_embedding, &stored.embedding),
            })
            .collect();

        // Stable sort: equal scores keep insertion order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
