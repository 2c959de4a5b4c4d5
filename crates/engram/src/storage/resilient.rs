//! Deadline and bounded retry around a long-term store.
//!
//! Each attempt is capped by `RetryPolicy::timeout`; transient failures are
//! retried with exponential backoff up to `max_attempts` total attempts.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::error::{EngramError, Result};
use crate::memory::types::{MemoryRecord, SearchHit};
use crate::storage::LongTermStore;

/// Timeout and retry settings for store calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// A single attempt with the given deadline
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }
}

/// Wraps a store so every call gets a deadline and bounded retries.
///
/// A timed-out `add` may still complete inside the inner store. The retry
/// re-sends the same record, and both built-in stores ignore an `add` whose
/// id is already stored, so the record lands exactly once.
pub struct ResilientStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: LongTermStore> ResilientStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn with_retry<'a, T, F, Fut>(&'a self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut(&'a S) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.initial_backoff;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let error = match tokio::time::timeout(self.policy.timeout, call(&self.inner)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => EngramError::ProviderUnavailable(format!(
                    "{operation} timed out after {:?}",
                    self.policy.timeout
                )),
            };

            if attempt < max_attempts {
                warn!(
                    "{} failed on attempt {}/{}, retrying in {:?}: {}",
                    operation, attempt, max_attempts, delay, error
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            last_error = Some(error);
        }

        Err(EngramError::ProviderUnavailable(format!(
            "{} failed after {} attempts: {}",
            operation,
            max_attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

#[async_trait]
impl<S: LongTermStore> LongTermStore for ResilientStore<S> {
    async fn add(&self, record: &MemoryRecord) -> Result<()> {
        self.with_retry("add", |store| store.add(record)).await
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.with_retry("search", |store| store.search(query, k))
            .await
    }

    async fn count(&self) -> Result<usize> {
        self.with_retry("count", |store| store.count()).await
    }
}
