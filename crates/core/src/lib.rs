//! mm-core: Core library for multimanager
//!
//! This crate provides the SDK-independent core of multimanager:
//! - Batch transfer executor (concurrent uploads and downloads with
//!   index-aligned results)
//! - Throttling-aware retry wrapper for key-value deletes
//! - Capability traits implemented by storage adapters
//! - Configuration management and object key helpers
//!
//! Nothing here depends on a specific cloud SDK.

pub mod config;
pub mod error;
pub mod item;
pub mod path;
pub mod retry;
pub mod sink;
pub mod traits;
pub mod transfer;

pub use config::{Config, ConfigManager};
pub use error::{Error, Result};
pub use item::{AttributeValue, DeleteItemOutput, DeleteItemRequest, Item, parse_key_attribute};
pub use path::{local_path_for, object_key_for, remove_object_prefix};
pub use retry::{
    RetryBudget, RetryBuilder, RetryItemStore, RetryPolicy, UNLIMITED_RETRIES,
    is_throttling_error, retry_on_throttle,
};
pub use sink::{MemorySink, WriteAt};
pub use traits::{
    ByteSink, ByteSource, GetObjectRequest, KeyValueStore, ObjectDownloader, ObjectUploader,
    PutObjectRequest, TransferOptions, UploadOutput,
};
pub use transfer::{
    BatchOptions, BatchSummary, DownloadResult, UploadResult, get_objects, put_objects,
};

/// Re-exported so adapters and callers share one token type
pub use tokio_util::sync::CancellationToken;
