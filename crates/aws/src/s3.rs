//! S3 transfer manager
//!
//! Wraps aws-sdk-s3 and implements the single-object transfer traits from
//! mm-core. Uploads that fit in one part go out as a single `PutObject`,
//! larger ones as a multipart upload. Downloads are split into ranged
//! `GetObject` requests written straight into the caller's sink.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt, TryStreamExt};
use jiff::Timestamp;
use mm_core::config::AwsConfig;
use mm_core::{
    ByteSource, Error, GetObjectRequest, ObjectDownloader, ObjectUploader, PutObjectRequest,
    Result, TransferOptions, UploadOutput, WriteAt,
};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::client::{format_sdk_error, load_sdk_config};

/// S3 limit on parts in one multipart upload
const MAX_PARTS: i32 = 10_000;

/// S3 transfer manager
#[derive(Debug, Clone)]
pub struct TransferManager {
    inner: aws_sdk_s3::Client,
}

impl TransferManager {
    /// Create a transfer manager from the AWS configuration section
    pub async fn new(config: &AwsConfig) -> Self {
        let sdk_config = load_sdk_config(config).await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self::from_client(aws_sdk_s3::Client::from_conf(s3_config))
    }

    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { inner: client }
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// List every key under `prefix`, following continuation tokens
    pub async fn list_keys(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .inner
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| {
                    let err_str = format_sdk_error(&e);
                    if err_str.contains("NoSuchBucket") {
                        Error::NotFound(format!("Bucket not found: {bucket}"))
                    } else {
                        Error::Network(err_str)
                    }
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|o| o.key())
                    .filter(|k| !k.ends_with('/'))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }
}

/// Version details of a finished write
#[derive(Debug, Default)]
struct Written {
    etag: Option<String>,
    version_id: Option<String>,
}

/// Size and version of an object, from `HeadObject`
#[derive(Debug)]
struct ObjectHead {
    size: u64,
    etag: Option<String>,
}

/// The S3 calls a single-object transfer is built from
#[async_trait]
trait S3Api: Send + Sync {
    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        data: Bytes,
    ) -> Result<Written>;

    async fn create_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> Result<String>;

    async fn send_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<CompletedPart>;

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<Written>;

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead>;

    /// Inclusive byte range, pinned to `etag` when given
    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        etag: Option<&str>,
        start: u64,
        end: u64,
    ) -> Result<ByteStream>;
}

#[async_trait]
impl S3Api for aws_sdk_s3::Client {
    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        data: Bytes,
    ) -> Result<Written> {
        let response = self
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Error::Network(format_sdk_error(&e)))?;

        Ok(Written {
            etag: response.e_tag().map(|s| s.trim_matches('"').to_string()),
            version_id: response.version_id().map(str::to_string),
        })
    }

    async fn create_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> Result<String> {
        let created = self
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::Network(format_sdk_error(&e)))?;

        created
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::General("CreateMultipartUpload returned no upload id".into()))
    }

    async fn send_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<CompletedPart> {
        let response = self
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Error::Network(format_sdk_error(&e)))?;

        Ok(CompletedPart::builder()
            .part_number(part_number)
            .set_e_tag(response.e_tag().map(str::to_string))
            .build())
    }

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<Written> {
        let response = self
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Error::Network(format_sdk_error(&e)))?;

        Ok(Written {
            etag: response.e_tag().map(|s| s.trim_matches('"').to_string()),
            version_id: response.version_id().map(str::to_string),
        })
    }

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| Error::Network(format_sdk_error(&e)))?;
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let head = self
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let err_str = format_sdk_error(&e);
                if err_str.contains("NotFound") || err_str.contains("NoSuchKey") {
                    Error::NotFound(format!("{bucket}/{key}"))
                } else {
                    Error::Network(err_str)
                }
            })?;

        Ok(ObjectHead {
            size: head.content_length().unwrap_or(0).max(0) as u64,
            etag: head.e_tag().map(str::to_string),
        })
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        etag: Option<&str>,
        start: u64,
        end: u64,
    ) -> Result<ByteStream> {
        let response = self
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes={start}-{end}"))
            .set_if_match(etag.map(str::to_string))
            .send()
            .await
            .map_err(|e| Error::Network(format_sdk_error(&e)))?;

        Ok(response.body)
    }
}

/// Upload one object: a single `PutObject` when it fits in one part,
/// otherwise a multipart upload
async fn upload_object<C: S3Api + ?Sized>(
    client: &C,
    mut request: PutObjectRequest,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> Result<UploadOutput> {
    let part_size = options.effective_part_size() as usize;

    let first = tokio::select! {
        first = read_part(&mut request.body, part_size) => first?,
        _ = cancel.cancelled() => return Err(Error::Cancelled),
    };

    if first.len() < part_size {
        let size = first.len() as u64;
        let written = tokio::select! {
            written = client.put_single(&request.bucket, &request.key, request.content_type.clone(), first) => written?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let mut output = UploadOutput::single(&request.key, size);
        output.etag = written.etag;
        output.version_id = written.version_id;
        Ok(output)
    } else {
        put_multipart(client, &mut request, first, options, cancel).await
    }
}

async fn put_multipart<C: S3Api + ?Sized>(
    client: &C,
    request: &mut PutObjectRequest,
    first: Bytes,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> Result<UploadOutput> {
    let bucket = request.bucket.clone();
    let key = request.key.clone();
    let upload_id = client
        .create_upload(&bucket, &key, request.content_type.clone())
        .await?;

    let result = tokio::select! {
        result = upload_parts(client, &bucket, &key, &upload_id, &mut request.body, first, options) => result,
        _ = cancel.cancelled() => Err(Error::Cancelled),
    };

    if result.is_err()
        && let Err(e) = client.abort_upload(&bucket, &key, &upload_id).await
    {
        tracing::warn!(
            key = %key,
            upload_id = %upload_id,
            error = %e,
            "Failed to abort multipart upload"
        );
    }
    result
}

async fn upload_parts<C: S3Api + ?Sized>(
    client: &C,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: &mut ByteSource,
    first: Bytes,
    options: &TransferOptions,
) -> Result<UploadOutput> {
    let part_size = options.effective_part_size() as usize;
    let concurrency = options.effective_concurrency();

    let mut in_flight = FuturesUnordered::new();
    let mut completed: Vec<CompletedPart> = Vec::new();
    let mut next = Some(first);
    let mut part_number: i32 = 1;
    let mut size: u64 = 0;

    loop {
        let chunk = match next.take() {
            Some(chunk) => chunk,
            None => read_part(body, part_size).await?,
        };

        // A source that ends exactly on a part boundary leaves an empty tail
        if chunk.is_empty() {
            break;
        }

        if part_number > MAX_PARTS {
            return Err(Error::General(format!(
                "{key} needs more than {MAX_PARTS} parts, increase the part size"
            )));
        }

        let last = chunk.len() < part_size;
        size += chunk.len() as u64;
        in_flight.push(client.send_part(bucket, key, upload_id, part_number, chunk));
        part_number += 1;

        if in_flight.len() >= concurrency
            && let Some(part) = in_flight.next().await
        {
            completed.push(part?);
        }

        if last {
            break;
        }
    }

    while let Some(part) = in_flight.next().await {
        completed.push(part?);
    }
    completed.sort_by_key(|p| p.part_number());
    let parts = completed.len();

    let written = client
        .complete_upload(bucket, key, upload_id, completed)
        .await?;

    tracing::debug!(key = %key, parts = parts, size = size, "Multipart upload complete");

    Ok(UploadOutput {
        key: key.to_string(),
        etag: written.etag,
        version_id: written.version_id,
        upload_id: Some(upload_id.to_string()),
        parts,
        size_bytes: size,
        uploaded_at: Timestamp::now(),
    })
}

/// Download one object as ranged parts written at their offsets
async fn download_object<C: S3Api + ?Sized>(
    client: &C,
    request: &GetObjectRequest,
    options: &TransferOptions,
) -> Result<u64> {
    let head = client.head(&request.bucket, &request.key).await?;
    if head.size == 0 {
        return Ok(0);
    }

    // Pin every range to the version seen by HeadObject
    let etag = head.etag.as_deref();
    let sink: &dyn WriteAt = request.sink.as_ref();

    let written: Vec<u64> = futures::stream::iter(part_ranges(head.size, options.effective_part_size()))
        .map(|(start, end)| download_range(client, request, etag, start, end, sink))
        .buffer_unordered(options.effective_concurrency())
        .try_collect()
        .await?;

    Ok(written.iter().sum())
}

async fn download_range<C: S3Api + ?Sized>(
    client: &C,
    request: &GetObjectRequest,
    etag: Option<&str>,
    start: u64,
    end: u64,
    sink: &dyn WriteAt,
) -> Result<u64> {
    let mut body = client
        .get_range(&request.bucket, &request.key, etag, start, end)
        .await?;

    let mut offset = start;
    while let Some(chunk) = body
        .try_next()
        .await
        .map_err(|e| Error::Network(e.to_string()))?
    {
        sink.write_all_at(&chunk, offset)?;
        offset += chunk.len() as u64;
    }

    Ok(offset - start)
}

#[async_trait]
impl ObjectUploader for TransferManager {
    async fn upload(
        &self,
        request: PutObjectRequest,
        options: &TransferOptions,
        cancel: CancellationToken,
    ) -> Result<UploadOutput> {
        upload_object(&self.inner, request, options, &cancel).await
    }
}

#[async_trait]
impl ObjectDownloader for TransferManager {
    async fn download(
        &self,
        request: GetObjectRequest,
        options: &TransferOptions,
        cancel: CancellationToken,
    ) -> Result<u64> {
        tokio::select! {
            result = download_object(&self.inner, &request, options) => result,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

/// Read up to `size` bytes, stopping early only at end of stream
async fn read_part(reader: &mut ByteSource, size: usize) -> std::io::Result<Bytes> {
    let mut buf = Vec::new();
    reader.take(size as u64).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Inclusive byte ranges covering `size` bytes in `part_size` steps
fn part_ranges(size: u64, part_size: u64) -> Vec<(u64, u64)> {
    (0..size)
        .step_by(part_size.max(1) as usize)
        .map(|start| (start, (start + part_size).min(size) - 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use mm_core::MemorySink;
    use mm_core::traits::MIN_PART_SIZE;

    const PART: usize = MIN_PART_SIZE as usize;

    /// In-memory stand-in for S3 that records every call
    #[derive(Default)]
    struct FakeS3 {
        calls: Mutex<Vec<String>>,
        /// Sizes of the parts received, by part number
        parts: Mutex<Vec<(i32, usize)>>,
        objects: HashMap<String, Vec<u8>>,
        fail_part: Option<i32>,
        /// Cancelled from inside `send_part`, which then never finishes
        cancel_in_part: Option<CancellationToken>,
    }

    impl FakeS3 {
        fn with_object(key: &str, data: Vec<u8>) -> Self {
            Self {
                objects: HashMap::from([(key.to_string(), data)]),
                ..Default::default()
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    #[async_trait]
    impl S3Api for FakeS3 {
        async fn put_single(
            &self,
            _bucket: &str,
            _key: &str,
            _content_type: Option<String>,
            data: Bytes,
        ) -> Result<Written> {
            self.record(format!("put {}", data.len()));
            Ok(Written {
                etag: Some("single".to_string()),
                version_id: None,
            })
        }

        async fn create_upload(
            &self,
            _bucket: &str,
            _key: &str,
            _content_type: Option<String>,
        ) -> Result<String> {
            self.record("create");
            Ok("upload-1".to_string())
        }

        async fn send_part(
            &self,
            _bucket: &str,
            _key: &str,
            _upload_id: &str,
            part_number: i32,
            data: Bytes,
        ) -> Result<CompletedPart> {
            self.record(format!("part {part_number}"));
            if let Some(cancel) = &self.cancel_in_part {
                cancel.cancel();
                return std::future::pending().await;
            }
            if self.fail_part == Some(part_number) {
                return Err(Error::Network("connection reset".to_string()));
            }
            self.parts.lock().unwrap().push((part_number, data.len()));
            Ok(CompletedPart::builder()
                .part_number(part_number)
                .e_tag(format!("etag-{part_number}"))
                .build())
        }

        async fn complete_upload(
            &self,
            _bucket: &str,
            _key: &str,
            _upload_id: &str,
            parts: Vec<CompletedPart>,
        ) -> Result<Written> {
            let numbers: Vec<String> = parts
                .iter()
                .filter_map(|p| p.part_number())
                .map(|n| n.to_string())
                .collect();
            self.record(format!("complete {}", numbers.join(",")));
            Ok(Written {
                etag: Some("multi-2".to_string()),
                version_id: Some("v1".to_string()),
            })
        }

        async fn abort_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
            self.record(format!("abort {upload_id}"));
            Ok(())
        }

        async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
            self.record("head");
            let data = self
                .objects
                .get(key)
                .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;
            Ok(ObjectHead {
                size: data.len() as u64,
                etag: Some("\"v1\"".to_string()),
            })
        }

        async fn get_range(
            &self,
            _bucket: &str,
            key: &str,
            etag: Option<&str>,
            start: u64,
            end: u64,
        ) -> Result<ByteStream> {
            assert_eq!(etag, Some("\"v1\""));
            self.record(format!("get {start}-{end}"));
            let data = &self.objects[key];
            Ok(ByteStream::from(data[start as usize..=end as usize].to_vec()))
        }
    }

    fn options() -> TransferOptions {
        TransferOptions {
            part_size: MIN_PART_SIZE,
            concurrency: 2,
        }
    }

    fn put_request(len: usize) -> PutObjectRequest {
        PutObjectRequest::new("bucket", "data.bin", Box::new(std::io::Cursor::new(vec![7u8; len])))
    }

    #[tokio::test]
    async fn test_upload_below_part_size_is_single_put() {
        let client = FakeS3::default();

        let output = upload_object(&client, put_request(PART - 1), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.calls(), vec![format!("put {}", PART - 1)]);
        assert!(!output.is_multipart());
        assert_eq!(output.size_bytes, (PART - 1) as u64);
        assert_eq!(output.etag.as_deref(), Some("single"));
    }

    #[tokio::test]
    async fn test_upload_of_exactly_one_part_goes_multipart() {
        let client = FakeS3::default();

        let output = upload_object(&client, put_request(PART), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.calls(), vec!["create", "part 1", "complete 1"]);
        assert!(output.is_multipart());
        assert_eq!(output.parts, 1);
        assert_eq!(output.upload_id.as_deref(), Some("upload-1"));
    }

    #[tokio::test]
    async fn test_source_ending_on_part_boundary_sends_no_empty_part() {
        let client = FakeS3::default();

        let output = upload_object(&client, put_request(2 * PART), &options(), &CancellationToken::new())
            .await
            .unwrap();

        let mut parts = client.parts.lock().unwrap().clone();
        parts.sort();
        assert_eq!(parts, vec![(1, PART), (2, PART)]);
        assert_eq!(client.count("complete 1,2"), 1);
        assert_eq!(output.size_bytes, 2 * PART as u64);
        assert_eq!(output.version_id.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_multipart_with_short_tail() {
        let client = FakeS3::default();

        let output = upload_object(&client, put_request(2 * PART + 3), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.parts, 3);
        assert_eq!(output.size_bytes, 2 * PART as u64 + 3);
        assert!(client.parts.lock().unwrap().contains(&(3, 3)));
    }

    #[tokio::test]
    async fn test_failed_part_aborts_upload() {
        let client = FakeS3 {
            fail_part: Some(2),
            ..Default::default()
        };

        let err = upload_object(&client, put_request(2 * PART + 1), &options(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network(_)));
        assert_eq!(client.count("abort upload-1"), 1);
        assert_eq!(client.count("complete"), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_parts_aborts_upload() {
        let cancel = CancellationToken::new();
        let client = FakeS3 {
            cancel_in_part: Some(cancel.clone()),
            ..Default::default()
        };

        let err = upload_object(&client, put_request(2 * PART), &options(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(client.count("abort upload-1"), 1);
        assert_eq!(client.count("complete"), 0);
    }

    #[tokio::test]
    async fn test_download_zero_length_object_writes_nothing() {
        let client = FakeS3::with_object("empty.txt", Vec::new());
        let sink = MemorySink::new();
        let request = GetObjectRequest::new("bucket", "empty.txt", Box::new(sink.clone()));

        let written = download_object(&client, &request, &options()).await.unwrap();

        assert_eq!(written, 0);
        assert!(sink.is_empty());
        assert_eq!(client.calls(), vec!["head"]);
    }

    #[tokio::test]
    async fn test_download_sums_ranged_parts() {
        let data: Vec<u8> = (0..2 * PART + 10).map(|i| (i % 251) as u8).collect();
        let client = FakeS3::with_object("big.bin", data.clone());
        let sink = MemorySink::new();
        let request = GetObjectRequest::new("bucket", "big.bin", Box::new(sink.clone()));

        let written = download_object(&client, &request, &options()).await.unwrap();

        assert_eq!(written, data.len() as u64);
        assert_eq!(client.count("get "), 3);
        assert_eq!(sink.contents(), data);
    }

    #[tokio::test]
    async fn test_download_missing_object() {
        let client = FakeS3::default();
        let request = GetObjectRequest::new("bucket", "gone", Box::new(MemorySink::new()));

        let err = download_object(&client, &request, &options()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_part_ranges_exact_multiple() {
        assert_eq!(part_ranges(10, 5), vec![(0, 4), (5, 9)]);
    }

    #[test]
    fn test_part_ranges_with_tail() {
        assert_eq!(part_ranges(11, 5), vec![(0, 4), (5, 9), (10, 10)]);
    }

    #[test]
    fn test_part_ranges_small_object() {
        assert_eq!(part_ranges(3, 8), vec![(0, 2)]);
        assert!(part_ranges(0, 8).is_empty());
    }

    #[tokio::test]
    async fn test_read_part_fills_then_drains() {
        let mut source: ByteSource = Box::new(std::io::Cursor::new(b"abcdefg".to_vec()));

        assert_eq!(read_part(&mut source, 3).await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(read_part(&mut source, 3).await.unwrap(), Bytes::from_static(b"def"));
        assert_eq!(read_part(&mut source, 3).await.unwrap(), Bytes::from_static(b"g"));
        assert!(read_part(&mut source, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_part_small_source_with_huge_part_size() {
        let mut source: ByteSource = Box::new(std::io::Cursor::new(b"tiny".to_vec()));

        let part = read_part(&mut source, 1 << 40).await.unwrap();
        assert_eq!(part, Bytes::from_static(b"tiny"));
    }
}
