//! Memory types for the Engram system
//!
//! Defines the short-term `Interaction`, the persisted `MemoryRecord`
//! and the `SearchHit` returned by long-term similarity search.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key reserved for the record kind
pub const RECORD_TYPE_KEY: &str = "type";

/// Record kind written by compaction
pub const COMPRESSED_DIALOG: &str = "compressed-dialog";

/// String-to-string metadata attached to a record.
///
/// Ordered so that serialized metadata is byte-stable.
pub type Metadata = BTreeMap<String, String>;

/// One user/assistant exchange held in the short-term buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// What the user said
    pub user: String,
    /// What the assistant answered
    pub assistant: String,
    /// When the interaction was appended
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    /// Create a new interaction stamped with the current time
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        }
    }

    /// Render as the two-line `User:` / `Assistant:` block
    pub fn render(&self) -> String {
        format!("User: {}\nAssistant: {}", self.user, self.assistant)
    }
}

/// A unit of long-term memory. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier for this record
    pub id: Uuid,
    /// Stored text; this is what gets embedded
    pub text: String,
    /// Free-form tags plus the reserved `type` key
    pub metadata: Metadata,
    /// When this record was created
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new record with a fresh id and timestamp
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            metadata,
            // Microseconds is what the persistent store keeps
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Create a record tagged `type = "compressed-dialog"`
    pub fn compressed_dialog(summary: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(RECORD_TYPE_KEY.to_string(), COMPRESSED_DIALOG.to_string());
        Self::new(summary, metadata)
    }

    /// The value of the reserved `type` key, if any
    pub fn record_type(&self) -> Option<&str> {
        self.metadata.get(RECORD_TYPE_KEY).map(String::as_str)
    }

    pub fn is_compressed_dialog(&self) -> bool {
        self.record_type() == Some(COMPRESSED_DIALOG)
    }
}

/// A record returned by similarity search together with its score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: MemoryRecord,
    /// Cosine similarity to the query; higher is closer
    pub score: f32,
}
