//! Head/tail dialog compaction
//!
//! Keeps the first and last non-blank lines of a transcript and replaces
//! the middle with a marker. Deterministic and lossy; no model involved.

use crate::config::CompressorConfig;
use crate::error::{EngramError, Result};

/// Line inserted where the middle of the transcript was dropped
pub const COMPRESSED_MARKER: &str = "... [compressed middle] ...";

/// Keeps `keep_head` leading and `keep_tail` trailing non-blank lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compressor {
    keep_head: usize,
    keep_tail: usize,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            keep_head: 6,
            keep_tail: 6,
        }
    }
}

impl Compressor {
    /// Create a compressor; a window that keeps nothing is rejected.
    pub fn new(keep_head: usize, keep_tail: usize) -> Result<Self> {
        if keep_head == 0 && keep_tail == 0 {
            return Err(EngramError::InvalidConfiguration(
                "compressor must keep at least one head or tail line".to_string(),
            ));
        }
        Ok(Self {
            keep_head,
            keep_tail,
        })
    }

    pub fn from_config(config: &CompressorConfig) -> Result<Self> {
        Self::new(config.keep_head, config.keep_tail)
    }

    pub fn keep_head(&self) -> usize {
        self.keep_head
    }

    pub fn keep_tail(&self) -> usize {
        self.keep_tail
    }

    /// Compress `text`.
    ///
    /// Blank and whitespace-only lines are ignored for counting and are not
    /// reproduced. If at most `keep_head + keep_tail` non-blank lines remain,
    /// `text` is returned verbatim (blank lines included). Otherwise the
    /// result is the head lines, a blank line, the marker, a blank line and
    /// the tail lines.
    pub fn compress(&self, text: &str) -> String {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

        if lines.len() <= self.keep_head + self.keep_tail {
            return text.to_string();
        }

        let head = &lines[..self.keep_head];
        let tail = &lines[lines.len() - self.keep_tail..];
        let marker = format!("\n{COMPRESSED_MARKER}\n");

        head.iter()
            .copied()
            .chain(std::iter::once(marker.as_str()))
            .chain(tail.iter().copied())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
