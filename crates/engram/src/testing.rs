//! Test utilities for engram - deterministic embedder and failing stores
//!
//! Lets unit and integration tests exercise the manager and stores without
//! downloading an embedding model or simulating real outages.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::{EngramError, Result};
use crate::memory::types::{MemoryRecord, SearchHit};
use crate::storage::LongTermStore;

/// Dimension produced by `HashEmbedder::new`, matching e5-small
pub const HASH_EMBEDDING_DIMENSION: usize = 384;

/// Embedder for fast tests that don't need real ML.
/// Produces deterministic vectors in `[-1, 1]` from a hash of the input text.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(HASH_EMBEDDING_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Deterministic "embedding" of `text`
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..self.dimension)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    Unavailable,
    Hanging,
    Misconfigured,
}

/// Store whose every call fails. Counts calls.
#[derive(Debug)]
pub struct FailingStore {
    mode: FailureMode,
    calls: AtomicUsize,
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FailingStore {
    /// Every call returns `ProviderUnavailable`
    pub fn new() -> Self {
        Self::with_mode(FailureMode::Unavailable)
    }

    /// Every call waits forever
    pub fn hanging() -> Self {
        Self::with_mode(FailureMode::Hanging)
    }

    /// Every call returns `InvalidConfiguration`
    pub fn misconfigured() -> Self {
        Self::with_mode(FailureMode::Misconfigured)
    }

    fn with_mode(mode: FailureMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FailureMode::Unavailable => Err(EngramError::ProviderUnavailable(
                "simulated provider outage".to_string(),
            )),
            FailureMode::Hanging => std::future::pending().await,
            FailureMode::Misconfigured => Err(EngramError::InvalidConfiguration(
                "simulated bad index".to_string(),
            )),
        }
    }
}

#[async_trait]
impl LongTermStore for FailingStore {
    async fn add(&self, _record: &MemoryRecord) -> Result<()> {
        self.fail().await
    }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>> {
        self.fail().await
    }

    async fn count(&self) -> Result<usize> {
        self.fail().await
    }
}

/// Store that fails the first `failures` calls, then delegates to `inner`.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    failures: usize,
    calls: AtomicUsize,
}

impl<S: LongTermStore> FlakyStore<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of calls received so far, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) < self.failures
    }
}

#[async_trait]
impl<S: LongTermStore> LongTermStore for FlakyStore<S> {
    async fn add(&self, record: &MemoryRecord) -> Result<()> {
        if self.should_fail() {
            return Err(EngramError::ProviderUnavailable("flaky add".to_string()));
        }
        self.inner.add(record).await
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.should_fail() {
            return Err(EngramError::ProviderUnavailable("flaky search".to_string()));
        }
        self.inner.search(query, k).await
    }

    async fn count(&self) -> Result<usize> {
        if self.should_fail() {
            return Err(EngramError::ProviderUnavailable("flaky count".to_string()));
        }
        self.inner.count().await
    }
}

/// Embedder that reports `dimension` but returns vectors one element short.
#[derive(Debug)]
pub struct WrongDimensionEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl WrongDimensionEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for WrongDimensionEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.5; self.dimension.saturating_sub(1)])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Store whose first `add` commits to `inner` and then stalls for `stall`.
///
/// Later calls delegate without delay.
#[derive(Debug)]
pub struct StallingStore<S> {
    inner: S,
    stall: Duration,
    adds: AtomicUsize,
}

impl<S: LongTermStore> StallingStore<S> {
    pub fn new(inner: S, stall: Duration) -> Self {
        Self {
            inner,
            stall,
            adds: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of `add` calls received so far
    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: LongTermStore> LongTermStore for StallingStore<S> {
    async fn add(&self, record: &MemoryRecord) -> Result<()> {
        let first = self.adds.fetch_add(1, Ordering::SeqCst) == 0;
        self.inner.add(record).await?;
        if first {
            tokio::time::sleep(self.stall).await;
        }
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.inner.search(query, k).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}
