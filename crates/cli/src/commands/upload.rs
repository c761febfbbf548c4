//! upload command - Upload a local directory to a bucket
//!
//! Every file under the directory becomes one object keyed by its file name
//! (plus an optional prefix). All files are uploaded concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use mm_aws::TransferManager;
use mm_core::{
    BatchSummary, Config, PutObjectRequest, UploadResult, object_key_for, put_objects,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::commands::{batch_exit_code, batch_options};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, Role};

/// Upload every file in a local directory to a bucket
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// S3 bucket to upload to
    #[arg(short, long)]
    pub bucket: String,

    /// Local directory to upload
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Key prefix prepended to every file name
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// Only upload files whose name matches this glob (e.g. "*.csv")
    #[arg(long)]
    pub include: Option<String>,
}

#[derive(Debug, Serialize)]
struct UploadReport {
    bucket: String,
    uploaded: usize,
    errors: usize,
    bytes: u64,
    items: Vec<UploadItem>,
}

#[derive(Debug, Serialize)]
struct UploadItem {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    multipart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the upload command
pub async fn execute(
    args: UploadArgs,
    config: &Config,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> ExitCode {
    let pattern = match args.include.as_deref().map(glob::Pattern::new).transpose() {
        Ok(p) => p,
        Err(e) => {
            formatter.error(&format!("Invalid --include pattern: {e}"));
            return ExitCode::UsageError;
        }
    };

    let files = match collect_files(&args.dir, pattern.as_ref()) {
        Ok(f) => f,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::NotFound;
        }
    };

    if files.is_empty() {
        formatter.warning(&format!("No files to upload in {}", args.dir.display()));
    }

    let requests = match open_requests(&args.bucket, &args.prefix, &files).await {
        Ok(r) => r,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::GeneralError;
        }
    };
    let keys: Vec<String> = requests.iter().map(|r| r.key.clone()).collect();

    let client = Arc::new(TransferManager::new(&config.aws).await);
    let options = batch_options(config, cancel.clone());

    tracing::info!(bucket = %args.bucket, files = keys.len(), "Starting upload batch");
    let spinner = formatter.spinner(&format!("Uploading {} file(s)...", keys.len()));
    let results = put_objects(client, requests, options).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let report = build_report(&args.bucket, keys, results);
    print_report(&report, formatter);
    tracing::info!(
        succeeded = report.uploaded,
        failed = report.errors,
        bytes = report.bytes,
        "Finished upload batch"
    );

    batch_exit_code(&cancel, report.errors)
}

/// Recursively collect regular files under `dir`, sorted by path
fn collect_files(dir: &Path, include: Option<&glob::Pattern>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .with_context(|| format!("Failed to read directory {}", current.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let matches = match include {
                    Some(pattern) => path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| pattern.matches(n)),
                    None => true,
                };
                if matches {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

async fn open_requests(
    bucket: &str,
    prefix: &str,
    files: &[PathBuf],
) -> anyhow::Result<Vec<PutObjectRequest>> {
    let mut requests = Vec::with_capacity(files.len());

    for path in files {
        let key = object_key_for(prefix, path)?;
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut request = PutObjectRequest::new(bucket, key, Box::new(file));
        if let Some(mime) = mime_guess::from_path(path).first() {
            request = request.with_content_type(mime.essence_str());
        }
        requests.push(request);
    }

    Ok(requests)
}

fn build_report(bucket: &str, keys: Vec<String>, results: Vec<UploadResult>) -> UploadReport {
    let summary = BatchSummary::from_uploads(&results);

    let items = keys
        .into_iter()
        .zip(results)
        .map(|(key, result)| match result {
            Ok(output) => UploadItem {
                key,
                multipart: output.is_multipart(),
                etag: output.etag,
                size_bytes: Some(output.size_bytes),
                error: None,
            },
            Err(e) => UploadItem {
                key,
                etag: None,
                size_bytes: None,
                multipart: false,
                error: Some(e.to_string()),
            },
        })
        .collect();

    UploadReport {
        bucket: bucket.to_string(),
        uploaded: summary.succeeded,
        errors: summary.failed,
        bytes: summary.bytes,
        items,
    }
}

fn print_report(report: &UploadReport, formatter: &Formatter) {
    formatter.report(report, |f| {
        let failures: Vec<Vec<String>> = report
            .items
            .iter()
            .filter_map(|item| {
                let error = item.error.as_ref()?;
                Some(vec![f.paint(Role::Key, &item.key), error.clone()])
            })
            .collect();
        f.table(&["Key", "Error"], failures);

        let message = format!(
            "{} object(s) uploaded to {} ({}), {} error(s)",
            report.uploaded,
            f.paint(Role::Name, &report.bucket),
            f.paint(Role::Size, &humansize::format_size(report.bytes, humansize::BINARY)),
            report.errors
        );
        if report.errors == 0 {
            f.success(&message);
        } else {
            f.println(&message);
        }
    });
}
