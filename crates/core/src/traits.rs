//! Capability traits consumed by the batch executor and retry wrapper
//!
//! These traits are SDK-independent; `mm-aws` implements them on top of
//! aws-sdk-s3 and aws-sdk-dynamodb, tests implement them with fakes.

use std::fmt;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::item::{DeleteItemOutput, DeleteItemRequest, Item};
use crate::sink::WriteAt;

/// Smallest part size S3 accepts for every part but the last
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest part size S3 accepts
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default part size used for multipart uploads and ranged downloads
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Default number of parts in flight within a single transfer
pub const DEFAULT_PART_CONCURRENCY: usize = 5;

/// Readable byte stream supplied by the caller for an upload
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Random-access writable sink supplied by the caller for a download
pub type ByteSink = Box<dyn WriteAt>;

/// Per-transfer settings, passed through the executor untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Size of each part in bytes
    pub part_size: u64,
    /// Parts in flight within one transfer
    pub concurrency: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_PART_CONCURRENCY,
        }
    }
}

impl TransferOptions {
    /// Part size clamped to the S3 limits
    pub fn effective_part_size(&self) -> u64 {
        self.part_size.clamp(MIN_PART_SIZE, MAX_PART_SIZE)
    }

    /// Concurrency with a floor of one
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// One object to upload
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: ByteSource,
    pub content_type: Option<String>,
}

impl PutObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: ByteSource) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl fmt::Debug for PutObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutObjectRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// One object to download into a caller-owned sink
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
    pub sink: ByteSink,
}

impl GetObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, sink: ByteSink) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            sink,
        }
    }
}

impl fmt::Debug for GetObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObjectRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Output of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutput {
    pub key: String,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    /// Set when the object was sent as a multipart upload
    pub upload_id: Option<String>,
    /// Number of parts sent (1 for a single-part put)
    pub parts: usize,
    pub size_bytes: u64,
    pub uploaded_at: Timestamp,
}

impl UploadOutput {
    /// Output for a single-part put
    pub fn single(key: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            etag: None,
            version_id: None,
            upload_id: None,
            parts: 1,
            size_bytes,
            uploaded_at: Timestamp::now(),
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.upload_id.is_some()
    }
}

/// Single-object upload, free to split into a multipart transfer
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    async fn upload(
        &self,
        request: PutObjectRequest,
        options: &TransferOptions,
        cancel: CancellationToken,
    ) -> Result<UploadOutput>;
}

/// Single-object download into a random-access sink, returning bytes written
#[async_trait]
pub trait ObjectDownloader: Send + Sync {
    async fn download(
        &self,
        request: GetObjectRequest,
        options: &TransferOptions,
        cancel: CancellationToken,
    ) -> Result<u64>;
}

/// Key-value item store
///
/// `delete_item` may fail with [`crate::Error::ThroughputExceeded`] when the
/// table is out of write capacity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>>;

    async fn put_item(&self, table: &str, item: Item) -> Result<()>;

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput>;
}
