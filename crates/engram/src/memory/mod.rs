//! Memory types and operations
//!
//! Short-term buffer, head/tail compressor and the manager that moves
//! compacted dialog into long-term storage.

pub mod buffer;
pub mod compressor;
pub mod manager;
pub mod types;

pub use buffer::ShortTermBuffer;
pub use compressor::{COMPRESSED_MARKER, Compressor};
pub use manager::{CONTEXT_SEPARATOR, ManagerState, MemoryManager};
pub use types::{COMPRESSED_DIALOG, Interaction, MemoryRecord, Metadata, RECORD_TYPE_KEY, SearchHit};
