//! download command - Download every object under a prefix
//!
//! Objects land in the target directory under their base name, so
//! `logs/2024/app.log` is written to `<dir>/app.log`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use mm_aws::TransferManager;
use mm_core::{
    BatchSummary, Config, DownloadResult, GetObjectRequest, get_objects, local_path_for,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::commands::{batch_exit_code, batch_options};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, Role};

/// Download every object under a prefix to a local directory
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// S3 bucket to download from
    #[arg(short, long)]
    pub bucket: String,

    /// Only download keys starting with this prefix
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Local directory to write into (created if missing)
    #[arg(short, long)]
    pub dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct DownloadReport {
    bucket: String,
    downloaded: usize,
    errors: usize,
    skipped: usize,
    bytes: u64,
    items: Vec<DownloadItem>,
}

#[derive(Debug, Serialize)]
struct DownloadItem {
    key: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Keys to fetch and where each one goes
#[derive(Debug, Default)]
struct DownloadPlan {
    targets: Vec<(String, PathBuf)>,
    /// Keys dropped because their base name is unusable or already taken
    skipped: Vec<String>,
}

/// Execute the download command
pub async fn execute(
    args: DownloadArgs,
    config: &Config,
    formatter: &Formatter,
    cancel: CancellationToken,
) -> ExitCode {
    let client = Arc::new(TransferManager::new(&config.aws).await);

    let keys = match client.list_keys(&args.bucket, args.prefix.as_deref()).await {
        Ok(keys) => keys,
        Err(e) => {
            formatter.error(&format!("Failed to list objects: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let plan = plan_downloads(&args.dir, keys);
    for key in &plan.skipped {
        formatter.warning(&format!("Skipping {key}: local name unusable or already taken"));
    }

    if let Err(e) = std::fs::create_dir_all(&args.dir) {
        formatter.error(&format!(
            "Failed to create directory {}: {e}",
            args.dir.display()
        ));
        return ExitCode::GeneralError;
    }

    let mut requests = Vec::with_capacity(plan.targets.len());
    for (key, path) in &plan.targets {
        match std::fs::File::create(path) {
            Ok(file) => requests.push(GetObjectRequest::new(&args.bucket, key, Box::new(file))),
            Err(e) => {
                formatter.error(&format!("Failed to create {}: {e}", path.display()));
                remove_files(plan.targets.iter().take(requests.len()).map(|(_, p)| p));
                return ExitCode::GeneralError;
            }
        }
    }

    tracing::info!(bucket = %args.bucket, objects = requests.len(), "Starting download batch");
    let spinner = formatter.spinner(&format!("Downloading {} object(s)...", requests.len()));
    let options = batch_options(config, cancel.clone());
    let results = get_objects(client, requests, options).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    // Partial files from failed items are not left behind
    remove_files(
        plan.targets
            .iter()
            .zip(&results)
            .filter(|(_, r)| r.is_err())
            .map(|((_, path), _)| path),
    );

    let report = build_report(&args.bucket, plan, results);
    print_report(&report, formatter);
    tracing::info!(
        succeeded = report.downloaded,
        failed = report.errors,
        bytes = report.bytes,
        "Finished download batch"
    );

    batch_exit_code(&cancel, report.errors)
}

fn plan_downloads(dir: &Path, keys: Vec<String>) -> DownloadPlan {
    let mut plan = DownloadPlan::default();
    let mut seen = HashSet::new();

    for key in keys {
        match local_path_for(dir, &key) {
            Ok(path) if seen.insert(path.clone()) => plan.targets.push((key, path)),
            Ok(_) | Err(_) => plan.skipped.push(key),
        }
    }

    plan
}

fn remove_files<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
}

fn build_report(bucket: &str, plan: DownloadPlan, results: Vec<DownloadResult>) -> DownloadReport {
    let summary = BatchSummary::from_downloads(&results);

    let items = plan
        .targets
        .into_iter()
        .zip(results)
        .map(|((key, path), result)| {
            let path = path.display().to_string();
            match result {
                Ok(bytes) => DownloadItem {
                    key,
                    path,
                    size_bytes: Some(bytes),
                    error: None,
                },
                Err(e) => DownloadItem {
                    key,
                    path,
                    size_bytes: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    DownloadReport {
        bucket: bucket.to_string(),
        downloaded: summary.succeeded,
        errors: summary.failed,
        skipped: plan.skipped.len(),
        bytes: summary.bytes,
        items,
    }
}

fn print_report(report: &DownloadReport, formatter: &Formatter) {
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

        let size = humansize::format_size(report.bytes, humansize::BINARY);
        let message = format!(
            "{} object(s) downloaded from {} ({}), {} error(s), {} skipped",
            report.downloaded,
            f.paint(Role::Name, &report.bucket),
            f.paint(Role::Size, &size),
            report.errors,
            report.skipped
        );
        if report.errors == 0 {
            f.success(&message);
        } else {
            f.println(&message);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::Error;
    use tempfile::TempDir;

    #[test]
    fn test_plan_uses_base_names() {
        let dir = Path::new("/tmp/out");
        let plan = plan_downloads(
            dir,
            vec!["logs/2024/app.log".to_string(), "top.txt".to_string()],
        );

        assert_eq!(
            plan.targets,
            vec![
                ("logs/2024/app.log".to_string(), dir.join("app.log")),
                ("top.txt".to_string(), dir.join("top.txt")),
            ]
        );
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_plan_skips_duplicate_and_unusable_names() {
        let plan = plan_downloads(
            Path::new("out"),
            vec![
                "a/data.csv".to_string(),
                "b/data.csv".to_string(),
                "folder/".to_string(),
                "x/..".to_string(),
            ],
        );

        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].0, "a/data.csv");
        assert_eq!(plan.skipped, vec!["b/data.csv", "folder/", "x/.."]);
    }

    #[test]
    fn test_remove_files_ignores_missing() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("partial.bin");
        std::fs::write(&present, b"half").unwrap();
        let missing = dir.path().join("never-created.bin");

        remove_files([present.clone(), missing].iter());
        assert!(!present.exists());
    }

    #[test]
    fn test_build_report_keeps_order() {
        let plan = DownloadPlan {
            targets: vec![
                ("a".to_string(), PathBuf::from("out/a")),
                ("b".to_string(), PathBuf::from("out/b")),
            ],
            skipped: vec!["c/".to_string()],
        };
        let results = vec![Err(Error::NotFound("a".to_string())), Ok(42)];

        let report = build_report("bucket", plan, results);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.bytes, 42);
        assert_eq!(report.items[0].error.as_deref(), Some("Not found: a"));
        assert_eq!(report.items[1].size_bytes, Some(42));
    }
}
