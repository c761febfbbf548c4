//! Batch transfer executor
//!
//! Fans a batch of uploads or downloads out to one tokio task per request and
//! fans the results back in, index-aligned with the input. The executor never
//! fails as a whole: every per-item failure is reported in that item's slot.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::traits::{
    GetObjectRequest, ObjectDownloader, ObjectUploader, PutObjectRequest, TransferOptions,
    UploadOutput,
};

/// Outcome of one upload
pub type UploadResult = Result<UploadOutput>;

/// Outcome of one download: bytes written into the sink
pub type DownloadResult = Result<u64>;

/// Options for a whole batch
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Passed unchanged to every single-item transfer
    pub transfer: TransferOptions,
    /// Cap on workers running at once. `None` runs every request concurrently.
    pub max_in_flight: Option<usize>,
    /// Forwarded to every worker; honored by the transfer itself
    pub cancel: CancellationToken,
}

impl BatchOptions {
    pub fn with_transfer(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_max_in_flight(mut self, max: Option<usize>) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Upload every request concurrently
///
/// `results[i]` is the outcome of `requests[i]`.
pub async fn put_objects<U>(
    client: Arc<U>,
    requests: Vec<PutObjectRequest>,
    options: BatchOptions,
) -> Vec<UploadResult>
where
    U: ObjectUploader + ?Sized + 'static,
{
    let transfer = options.transfer;
    run_batch(requests, &options, move |request, cancel| {
        let client = Arc::clone(&client);
        async move {
            let key = request.key.clone();
            let result = client.upload(request, &transfer, cancel).await;
            tracing::debug!(key = %key, ok = result.is_ok(), "Upload finished");
            result
        }
    })
    .await
}

/// Download every request concurrently into its sink
///
/// `results[i]` is the outcome of `requests[i]`.
pub async fn get_objects<D>(
    client: Arc<D>,
    requests: Vec<GetObjectRequest>,
    options: BatchOptions,
) -> Vec<DownloadResult>
where
    D: ObjectDownloader + ?Sized + 'static,
{
    let transfer = options.transfer;
    run_batch(requests, &options, move |request, cancel| {
        let client = Arc::clone(&client);
        async move {
            let key = request.key.clone();
            let result = client.download(request, &transfer, cancel).await;
            tracing::debug!(key = %key, ok = result.is_ok(), "Download finished");
            result
        }
    })
    .await
}

async fn run_batch<Req, T, F, Fut>(
    requests: Vec<Req>,
    options: &BatchOptions,
    worker: F,
) -> Vec<Result<T>>
where
    Req: Send + 'static,
    T: Send + 'static,
    F: Fn(Req, CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let count = requests.len();
    if count == 0 {
        return Vec::new();
    }

    let limiter = options
        .max_in_flight
        .map(|max| Arc::new(Semaphore::new(max.clamp(1, Semaphore::MAX_PERMITS))));

    let mut tasks = JoinSet::new();
    for (index, request) in requests.into_iter().enumerate() {
        let cancel = options.cancel.clone();
        let work = worker(request, cancel.clone());
        let limiter = limiter.clone();

        tasks.spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => {
                    tokio::select! {
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(p) => Some(p),
                            Err(e) => return (index, Err(Error::General(e.to_string()))),
                        },
                        _ = cancel.cancelled() => return (index, Err(Error::Cancelled)),
                    }
                }
                None => None,
            };

            let result = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Error::General(format!(
                        "transfer worker panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });

            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<T>>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::warn!(error = %e, "Transfer worker did not complete"),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Err(Error::General("transfer worker did not report".into())))
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Success and error counts over a result vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Bytes moved by the successful items
    pub bytes: u64,
}

impl BatchSummary {
    pub fn from_uploads(results: &[UploadResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            match r {
                Ok(output) => {
                    acc.succeeded += 1;
                    acc.bytes += output.size_bytes;
                }
                Err(_) => acc.failed += 1,
            }
            acc
        })
    }

    pub fn from_downloads(results: &[DownloadResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            match r {
                Ok(bytes) => {
                    acc.succeeded += 1;
                    acc.bytes += bytes;
                }
                Err(_) => acc.failed += 1,
            }
            acc
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
