//! delete command - Delete one item, retrying while throughput is exceeded

use std::time::Duration;

use clap::Args;
use mm_aws::DynamoStore;
use mm_core::{
    Config, DeleteItemRequest, Item, KeyValueStore, RetryItemStore, RetryPolicy,
    parse_key_attribute,
};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, Role};

/// Delete one DynamoDB item by primary key
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Table name
    #[arg(short, long)]
    pub table: String,

    /// Key attribute as NAME=VALUE; prefix the value with n: for a number
    #[arg(short, long = "key", value_name = "NAME=VALUE", num_args = 1.., required = true)]
    pub keys: Vec<String>,

    /// Retries while throughput is exceeded; -1 retries forever
    #[arg(long, allow_negative_numbers = true)]
    pub retries: Option<i64>,

    /// Pause between retries in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Print the deleted item
    #[arg(long)]
    pub return_old: bool,
}

#[derive(Debug, Serialize)]
struct DeleteReport {
    table: String,
    key: Item,
    deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<Item>,
}

/// Execute the delete command
pub async fn execute(args: DeleteArgs, config: &Config, formatter: &Formatter) -> ExitCode {
    let key = match parse_key(&args.keys) {
        Ok(key) => key,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    let policy = resolve_policy(config, &args);
    // An invalid budget fails before any client is built or request sent
    if let Err(e) = policy.budget() {
        formatter.error(&e.to_string());
        return ExitCode::from_error(&e);
    }

    let store = RetryItemStore::with_policy(DynamoStore::new(&config.aws).await, policy);
    let request = DeleteItemRequest::new(&args.table, key.clone()).return_old(args.return_old);

    tracing::info!(table = %args.table, retries = policy.retries, "Deleting item");
    match store.delete_item(request).await {
        Ok(output) => {
            let report = DeleteReport {
                table: args.table,
                key,
                deleted: true,
                attributes: output.attributes,
            };
            print_report(&report, formatter);
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Failed to delete item from {}: {e}", args.table));
            ExitCode::from_error(&e)
        }
    }
}

fn parse_key(raw: &[String]) -> mm_core::Result<Item> {
    raw.iter().map(|attr| parse_key_attribute(attr)).collect()
}

/// Retry settings from the config file, overridden by flags
fn resolve_policy(config: &Config, args: &DeleteArgs) -> RetryPolicy {
    let mut policy = config.retry_policy();
    if let Some(retries) = args.retries {
        policy.retries = retries;
    }
    if let Some(ms) = args.backoff_ms {
        policy.backoff = Duration::from_millis(ms);
    }
    policy
}

fn print_report(report: &DeleteReport, formatter: &Formatter) {
    formatter.report(report, |f| {
        let mut key: Vec<String> = report
            .key
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        key.sort();

        f.success(&format!(
            "Deleted {} from {}",
            f.paint(Role::Key, &key.join(", ")),
            f.paint(Role::Name, &report.table)
        ));

        if let Some(attributes) = &report.attributes {
            let mut rows: Vec<Vec<String>> = attributes
                .iter()
                .map(|(name, value)| vec![name.clone(), value.to_string()])
                .collect();
            rows.sort();
            f.table(&["Attribute", "Value"], rows);
        }
    });
}
