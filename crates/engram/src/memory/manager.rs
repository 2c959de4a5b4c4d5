//! Two-tier memory manager
//!
//! Accumulates interactions in a short-term buffer and, when asked, compacts
//! them into a single long-term record.
//!
//! Retrieval only sees the long-term store. Interactions that have not been
//! compacted yet are invisible to `retrieve_context`, and they are lost if
//! the process exits before compaction. Callers that need the recent dialog
//! should read `short_term()` directly.

use tracing::{debug, info, warn};

use crate::config::{Config, ManagerConfig};
use crate::error::{EngramError, Result};
use crate::memory::buffer::ShortTermBuffer;
use crate::memory::compressor::Compressor;
use crate::memory::types::{
    COMPRESSED_DIALOG, Interaction, MemoryRecord, Metadata, RECORD_TYPE_KEY, SearchHit,
};
use crate::storage::LongTermStore;

/// Separator placed between retrieved records
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Where the manager is in its compaction cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Collecting interactions; the resting state
    Accumulating,
    /// Inside `maybe_compress`, between rendering and clearing
    Compacting,
}

/// Holds the state at `Compacting` until dropped, including when the
/// compaction future is cancelled mid-write.
struct CompactingGuard<'a> {
    state: &'a mut ManagerState,
}

impl<'a> CompactingGuard<'a> {
    fn enter(state: &'a mut ManagerState) -> Self {
        *state = ManagerState::Compacting;
        Self { state }
    }
}

impl Drop for CompactingGuard<'_> {
    fn drop(&mut self) {
        *self.state = ManagerState::Accumulating;
    }
}

/// Orchestrates the short-term buffer, the compressor and a long-term store.
///
/// Mutating calls take `&mut self`; share a manager between tasks behind a
/// `tokio::sync::Mutex`, one per conversation.
pub struct MemoryManager<S> {
    short_term: ShortTermBuffer,
    long_term: S,
    compressor: Compressor,
    config: ManagerConfig,
    state: ManagerState,
}

impl<S: LongTermStore> MemoryManager<S> {
    pub fn new(long_term: S, compressor: Compressor, config: ManagerConfig) -> Self {
        Self {
            short_term: ShortTermBuffer::new(),
            long_term,
            compressor,
            config,
            state: ManagerState::Accumulating,
        }
    }

    /// Build from a full configuration; fails if the compressor window is empty.
    pub fn from_config(long_term: S, config: &Config) -> Result<Self> {
        let compressor = Compressor::from_config(&config.compressor)?;
        Ok(Self::new(long_term, compressor, config.manager.clone()))
    }

    /// Record one user/assistant exchange
    pub fn save_interaction(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.short_term.append(Interaction::new(user, assistant));
    }

    /// Compact the buffer into one long-term record if its rendered length
    /// has reached `threshold_chars`.
    ///
    /// Returns the stored record, or `None` when below the threshold. If the
    /// store rejects the record the buffer is left untouched and the error
    /// is returned.
    pub async fn maybe_compress(&mut self, threshold_chars: usize) -> Result<Option<MemoryRecord>> {
        let history = self.short_term.render();
        let length = history.chars().count();
        if length < threshold_chars {
            debug!("Buffer at {length}/{threshold_chars} chars, not compacting");
            return Ok(None);
        }

        let record = MemoryRecord::compressed_dialog(self.compressor.compress(&history));
        let compacting = CompactingGuard::enter(&mut self.state);
        let result = self.long_term.add(&record).await;
        drop(compacting);

        match result {
            Ok(()) => {
                info!(
                    "Compacted {} interactions ({} chars) into record {}",
                    self.short_term.len(),
                    length,
                    record.id
                );
                self.short_term.clear();
                Ok(Some(record))
            }
            Err(e) => {
                warn!("Compaction failed, keeping {} interactions: {e}", self.short_term.len());
                Err(e)
            }
        }
    }

    /// `maybe_compress` with the configured threshold
    pub async fn compress_if_due(&mut self) -> Result<Option<MemoryRecord>> {
        self.maybe_compress(self.config.threshold_chars).await
    }

    /// Ranked long-term hits for `query`. Empty query yields no hits.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.long_term.search(query, k).await
    }

    /// Texts of the top `k` long-term records, best first, joined by a blank line.
    ///
    /// Never includes uncompacted short-term content.
    pub async fn retrieve_context(&self, query: &str, k: usize) -> Result<String> {
        let hits = self.search(query, k).await?;
        Ok(hits
            .iter()
            .map(|hit| hit.record.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR))
    }

    /// `retrieve_context` with the configured `retrieval_k`
    pub async fn recall(&self, query: &str) -> Result<String> {
        self.retrieve_context(query, self.config.retrieval_k).await
    }

    /// Store a caller-authored record directly in long-term memory.
    ///
    /// The `compressed-dialog` type is reserved for compaction output.
    pub async fn add_memory(
        &self,
        text: impl Into<String>,
        metadata: Metadata,
    ) -> Result<MemoryRecord> {
        if metadata.get(RECORD_TYPE_KEY).map(String::as_str) == Some(COMPRESSED_DIALOG) {
            return Err(EngramError::ReservedMetadata(format!(
                "{RECORD_TYPE_KEY}={COMPRESSED_DIALOG} is written only by compaction"
            )));
        }

        let record = MemoryRecord::new(text, metadata);
        self.long_term.add(&record).await?;
        Ok(record)
    }

    pub fn short_term(&self) -> &ShortTermBuffer {
        &self.short_term
    }

    pub fn store(&self) -> &S {
        &self.long_term
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }
}
