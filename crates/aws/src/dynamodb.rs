//! DynamoDB item store
//!
//! Implements the mm-core `KeyValueStore` trait on top of aws-sdk-dynamodb.
//! `ProvisionedThroughputExceededException` is surfaced as
//! [`Error::ThroughputExceeded`] so the retry wrapper can recognize it.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::{AttributeValue as SdkValue, ReturnValue};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::Blob;
use aws_smithy_types::error::display::DisplayErrorContext;
use mm_core::config::AwsConfig;
use mm_core::{AttributeValue, DeleteItemOutput, DeleteItemRequest, Error, Item, KeyValueStore, Result};

use crate::client::{format_sdk_error, load_sdk_config};

/// DynamoDB client wrapper
#[derive(Debug, Clone)]
pub struct DynamoStore {
    inner: aws_sdk_dynamodb::Client,
}

impl DynamoStore {
    /// Create a store from the AWS configuration section
    ///
    /// SDK-level retries are disabled; `RetryItemStore` owns retrying
    /// throttled calls, one request per attempt.
    pub async fn new(config: &AwsConfig) -> Self {
        let sdk_config = load_sdk_config(config).await;
        let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::disabled())
            .build();
        Self::from_client(aws_sdk_dynamodb::Client::from_conf(dynamo_config))
    }

    pub fn from_client(client: aws_sdk_dynamodb::Client) -> Self {
        Self { inner: client }
    }

    /// Get the underlying aws-sdk-dynamodb client
    pub fn inner(&self) -> &aws_sdk_dynamodb::Client {
        &self.inner
    }
}

#[async_trait]
impl KeyValueStore for DynamoStore {
    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let response = self
            .inner
            .get_item()
            .table_name(table)
            .set_key(Some(to_sdk_item(&key)))
            .send()
            .await
            .map_err(|e| {
                map_dynamo_error(
                    e,
                    GetItemError::is_provisioned_throughput_exceeded_exception,
                    GetItemError::is_resource_not_found_exception,
                )
            })?;

        Ok(response.item().map(from_sdk_item))
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<()> {
        self.inner
            .put_item()
            .table_name(table)
            .set_item(Some(to_sdk_item(&item)))
            .send()
            .await
            .map_err(|e| {
                map_dynamo_error(
                    e,
                    PutItemError::is_provisioned_throughput_exceeded_exception,
                    PutItemError::is_resource_not_found_exception,
                )
            })?;

        Ok(())
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput> {
        let mut builder = self
            .inner
            .delete_item()
            .table_name(&request.table)
            .set_key(Some(to_sdk_item(&request.key)));

        if request.return_old {
            builder = builder.return_values(ReturnValue::AllOld);
        }

        let response = builder.send().await.map_err(|e| {
            map_dynamo_error(
                e,
                DeleteItemError::is_provisioned_throughput_exceeded_exception,
                DeleteItemError::is_resource_not_found_exception,
            )
        })?;

        Ok(DeleteItemOutput {
            attributes: response.attributes().map(from_sdk_item),
        })
    }
}

/// Classify a DynamoDB operation error
fn map_dynamo_error<E>(
    error: SdkError<E, HttpResponse>,
    is_throttled: fn(&E) -> bool,
    is_missing: fn(&E) -> bool,
) -> Error
where
    E: std::error::Error + 'static,
{
    if let Some(service_err) = error.as_service_error() {
        if is_throttled(service_err) {
            return Error::ThroughputExceeded(DisplayErrorContext(service_err).to_string());
        }
        if is_missing(service_err) {
            return Error::NotFound(DisplayErrorContext(service_err).to_string());
        }
    }
    Error::Network(format_sdk_error(&error))
}

fn to_sdk_item(item: &Item) -> HashMap<String, SdkValue> {
    item.iter()
        .map(|(k, v)| (k.clone(), to_sdk_value(v)))
        .collect()
}

fn to_sdk_value(value: &AttributeValue) -> SdkValue {
    match value {
        AttributeValue::S(s) => SdkValue::S(s.clone()),
        AttributeValue::N(n) => SdkValue::N(n.clone()),
        AttributeValue::B(b) => SdkValue::B(Blob::new(b.clone())),
        AttributeValue::Bool(b) => SdkValue::Bool(*b),
        AttributeValue::Null => SdkValue::Null(true),
        AttributeValue::L(values) => SdkValue::L(values.iter().map(to_sdk_value).collect()),
        AttributeValue::M(map) => SdkValue::M(to_sdk_item(map)),
    }
}

fn from_sdk_item(item: &HashMap<String, SdkValue>) -> Item {
    item.iter()
        .map(|(k, v)| (k.clone(), from_sdk_value(v)))
        .collect()
}

fn from_sdk_value(value: &SdkValue) -> AttributeValue {
    match value {
        SdkValue::S(s) => AttributeValue::S(s.clone()),
        SdkValue::N(n) => AttributeValue::N(n.clone()),
        SdkValue::B(b) => AttributeValue::B(b.as_ref().to_vec()),
        SdkValue::Bool(b) => AttributeValue::Bool(*b),
        SdkValue::Null(_) => AttributeValue::Null,
        SdkValue::L(values) => AttributeValue::L(values.iter().map(from_sdk_value).collect()),
        SdkValue::M(map) => AttributeValue::M(from_sdk_item(map)),
        SdkValue::Ss(set) => AttributeValue::L(set.iter().cloned().map(AttributeValue::S).collect()),
        SdkValue::Ns(set) => AttributeValue::L(set.iter().cloned().map(AttributeValue::N).collect()),
        SdkValue::Bs(set) => AttributeValue::L(
            set.iter()
                .map(|b| AttributeValue::B(b.as_ref().to_vec()))
                .collect(),
        ),
        other => {
            tracing::warn!(value = ?other, "Unsupported DynamoDB attribute type");
            AttributeValue::Null
        }
    }
}
