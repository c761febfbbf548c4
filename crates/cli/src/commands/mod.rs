//! Command definitions and shared setup

mod completions;
mod delete;
mod download;
mod upload;

use std::path::PathBuf;

use clap::{Args, Subcommand};
use mm_core::{BatchOptions, Config, ConfigManager};
use tokio_util::sync::CancellationToken;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use completions::CompletionsArgs;
use delete::DeleteArgs;
use download::DownloadArgs;
use upload::UploadArgs;

/// Flags accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file (default: $MM_CONFIG_DIR/config.toml)
    #[arg(long, global = true, env = "MM_CONFIG")]
    pub config: Option<PathBuf>,

    /// AWS region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Custom endpoint (S3-compatible store, DynamoDB Local)
    #[arg(long, global = true)]
    pub endpoint_url: Option<String>,

    /// Maximum objects transferred at once (default: unbounded)
    #[arg(long, global = true)]
    pub max_in_flight: Option<usize>,

    /// Part size in MiB for multipart uploads and ranged downloads
    #[arg(long, global = true)]
    pub part_size_mib: Option<u64>,

    /// Parts in flight within one object
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,
}

impl GlobalArgs {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            quiet: self.quiet,
        }
    }

    /// Apply command-line overrides on top of the file configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(region) = &self.region {
            config.aws.region = Some(region.clone());
        }
        if let Some(endpoint) = &self.endpoint_url {
            config.aws.endpoint_url = Some(endpoint.clone());
        }
        if let Some(max) = self.max_in_flight {
            config.transfer.max_in_flight = Some(max);
        }
        if let Some(mib) = self.part_size_mib {
            config.transfer.part_size_mib = mib;
        }
        if let Some(n) = self.concurrency {
            config.transfer.concurrency = n;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload every file in a local directory to a bucket
    Upload(UploadArgs),

    /// Download every object under a prefix to a local directory
    Download(DownloadArgs),

    /// Delete one DynamoDB item, retrying while throughput is exceeded
    Delete(DeleteArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

/// Execute a command
pub async fn execute(command: Commands, global: GlobalArgs, cancel: CancellationToken) -> ExitCode {
    let formatter = Formatter::new(global.output_config());

    match command {
        Commands::Upload(args) => match resolve_config(&global, &formatter) {
            Ok(config) => upload::execute(args, &config, &formatter, cancel).await,
            Err(code) => code,
        },
        Commands::Download(args) => match resolve_config(&global, &formatter) {
            Ok(config) => download::execute(args, &config, &formatter, cancel).await,
            Err(code) => code,
        },
        Commands::Delete(args) => match resolve_config(&global, &formatter) {
            Ok(config) => delete::execute(args, &config, &formatter).await,
            Err(code) => code,
        },
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Helper to load the configuration, reporting failures through the formatter
fn resolve_config(global: &GlobalArgs, formatter: &Formatter) -> Result<Config, ExitCode> {
    load_config(global).map_err(|e| {
        formatter.error(&format!("Failed to load config: {e}"));
        ExitCode::from_error(&e)
    })
}

fn load_config(global: &GlobalArgs) -> mm_core::Result<Config> {
    let manager = match &global.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };

    let mut config = manager.load()?;
    global.apply(&mut config);
    config.validate()?;

    tracing::debug!(path = %manager.path().display(), "Loaded configuration");
    Ok(config)
}

/// Batch options derived from the configuration
pub(crate) fn batch_options(config: &Config, cancel: CancellationToken) -> BatchOptions {
    BatchOptions::default()
        .with_transfer(config.transfer_options())
        .with_max_in_flight(config.transfer.max_in_flight)
        .with_cancel(cancel)
}

/// Exit code for a finished batch: interruption wins over item failures
pub(crate) fn batch_exit_code(cancel: &CancellationToken, errors: usize) -> ExitCode {
    if cancel.is_cancelled() {
        ExitCode::Interrupted
    } else if errors > 0 {
        ExitCode::GeneralError
    } else {
        ExitCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_file_values() {
        let global = GlobalArgs {
            region: Some("us-east-2".to_string()),
            max_in_flight: Some(8),
            part_size_mib: Some(16),
            ..Default::default()
        };

        let mut config = Config::default();
        config.aws.region = Some("eu-west-1".to_string());
        global.apply(&mut config);

        assert_eq!(config.aws.region.as_deref(), Some("us-east-2"));
        assert_eq!(config.transfer.max_in_flight, Some(8));
        assert_eq!(config.transfer.part_size_mib, 16);
        // Untouched values keep their defaults
        assert_eq!(config.transfer.concurrency, 5);
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mm.toml");
        std::fs::write(&path, "[transfer]\nmax_in_flight = 4\n").unwrap();

        let global = GlobalArgs {
            config: Some(path),
            concurrency: Some(2),
            ..Default::default()
        };

        let config = load_config(&global).unwrap();
        assert_eq!(config.transfer.max_in_flight, Some(4));
        assert_eq!(config.transfer.concurrency, 2);
    }

    #[test]
    fn test_load_config_rejects_bad_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let global = GlobalArgs {
            config: Some(dir.path().join("missing.toml")),
            max_in_flight: Some(0),
            ..Default::default()
        };

        assert!(load_config(&global).is_err());
    }

    #[test]
    fn test_load_config_rejects_oversized_max_in_flight() {
        let dir = tempfile::TempDir::new().unwrap();
        let global = GlobalArgs {
            config: Some(dir.path().join("missing.toml")),
            max_in_flight: Some(usize::MAX),
            ..Default::default()
        };

        assert!(matches!(load_config(&global), Err(mm_core::Error::Config(_))));
    }

    #[test]
    fn test_batch_exit_code() {
        let cancel = CancellationToken::new();
        assert_eq!(batch_exit_code(&cancel, 0), ExitCode::Success);
        assert_eq!(batch_exit_code(&cancel, 2), ExitCode::GeneralError);

        cancel.cancel();
        assert_eq!(batch_exit_code(&cancel, 0), ExitCode::Interrupted);
        assert_eq!(batch_exit_code(&cancel, 2), ExitCode::Interrupted);
    }

    #[test]
    fn test_batch_options_follow_config() {
        let mut config = Config::default();
        config.transfer.max_in_flight = Some(3);

        let options = batch_options(&config, CancellationToken::new());
        assert_eq!(options.max_in_flight, Some(3));
        assert_eq!(options.transfer, config.transfer_options());
    }
}
