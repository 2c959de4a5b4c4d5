//! Engram - two-tier conversational memory
//!
//! Dialog accumulates in a short-term buffer; once it grows past a
//! threshold it is compacted (head and tail kept, middle dropped) into a
//! persistent, similarity-searchable long-term store.

pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod storage;
pub mod telemetry;
pub mod testing;

pub use config::Config;
pub use error::{EngramError, Result};
pub use memory::{Compressor, Interaction, MemoryManager, MemoryRecord, SearchHit};
pub use storage::LongTermStore;

use embedding::FastEmbedder;
use storage::{LanceStore, ResilientStore, RetryPolicy};

/// Long-term store used by `open`
pub type DefaultStore = ResilientStore<LanceStore<FastEmbedder>>;

/// Build the production stack described by `config`: fastembed embeddings,
/// a LanceDB table under `storage.data_dir`, and the configured deadline and
/// retry policy around it.
pub async fn open(config: &Config) -> Result<MemoryManager<DefaultStore>> {
    config.validate()?;

    let embedder = FastEmbedder::new(&config.embedding)?;
    let store = LanceStore::from_config(&config.storage, embedder).await?;
    let store = ResilientStore::new(store, RetryPolicy::from_config(&config.provider));

    tracing::info!(
        "Long-term memory ready at {} (table {})",
        config.storage.data_dir.display(),
        config.storage.table_name
    );
    MemoryManager::from_config(store, config)
}
