//! Throttling-aware retry with a fixed backoff
//!
//! Retries a single remote call only when it fails with
//! [`Error::ThroughputExceeded`]. Every other error is returned as-is on the
//! first attempt. The pause before each retry is a fixed duration with no
//! growth and no jitter; extend [`RetryPolicy`] if that is ever needed.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::item::{DeleteItemOutput, DeleteItemRequest, Item};
use crate::traits::KeyValueStore;

/// Reserved retry count meaning "retry forever"
pub const UNLIMITED_RETRIES: i64 = -1;

/// Retry count and fixed backoff, configured once and reused across calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `-1` for unlimited
    pub retries: i64,
    /// Pause before each retry
    #[serde(with = "millis")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: i64, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Decode the raw retry count
    ///
    /// Fails with [`Error::InvalidRetry`] for any negative value other than
    /// [`UNLIMITED_RETRIES`].
    pub fn budget(&self) -> Result<RetryBudget> {
        match self.retries {
            UNLIMITED_RETRIES => Ok(RetryBudget::Unlimited),
            n if n >= 0 => Ok(RetryBudget::Limited(n as u64)),
            n => Err(Error::InvalidRetry(n)),
        }
    }
}

/// Decoded retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Limited(u64),
    Unlimited,
}

impl fmt::Display for RetryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryBudget::Limited(n) => write!(f, "{n}"),
            RetryBudget::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Check if an error is the throttling kind that drives retries
pub fn is_throttling_error(error: &Error) -> bool {
    error.is_throughput_exceeded()
}

/// Run `operation`, retrying on throttling according to `policy`
///
/// The budget is validated before the first attempt, so an invalid policy
/// never reaches the remote.
///
/// # Example
/// ```ignore
/// let output = retry_on_throttle(&policy, || store.delete_item(request.clone())).await?;
/// ```
pub async fn retry_on_throttle<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let budget = policy.budget()?;
    let mut remaining = match budget {
        RetryBudget::Limited(n) => Some(n),
        RetryBudget::Unlimited => None,
    };
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_throttling_error(&e) => return Err(e),
            Err(e) => {
                match remaining.as_mut() {
                    Some(left) if *left == 0 => return Err(e),
                    Some(left) => *left -= 1,
                    None => {}
                }

                tracing::debug!(
                    attempt = attempt,
                    budget = %budget,
                    backoff_ms = policy.backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after throttling"
                );

                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

/// Retry policy builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    retries: i64,
    backoff_ms: u64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            retries: 3,
            backoff_ms: 100,
        }
    }

    pub fn retries(mut self, n: i64) -> Self {
        self.retries = n;
        self
    }

    pub fn unlimited(mut self) -> Self {
        self.retries = UNLIMITED_RETRIES;
        self
    }

    pub fn backoff_ms(mut self, ms: u64) -> Self {
        self.backoff_ms = ms;
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Item store wrapper that retries throttled deletes
///
/// Only `delete_item` is intercepted; reads and writes go straight to the
/// wrapped store.
#[derive(Debug, Clone)]
pub struct RetryItemStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: KeyValueStore> RetryItemStore<S> {
    pub fn new(inner: S, retries: i64, backoff: Duration) -> Self {
        Self::with_policy(inner, RetryPolicy::new(retries, backoff))
    }

    pub fn with_policy(inner: S, policy: RetryPolicy) -> Self {
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
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for RetryItemStore<S> {
    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        self.inner.get_item(table, key).await
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<()> {
        self.inner.put_item(table, item).await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput> {
        retry_on_throttle(&self.policy, || self.inner.delete_item(request.clone())).await
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
