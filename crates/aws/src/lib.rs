//! mm-aws: AWS SDK adapter for multimanager
//!
//! This crate implements the mm-core capability traits using aws-sdk-s3
//! (uploads and downloads through [`TransferManager`]) and aws-sdk-dynamodb
//! (item operations through [`DynamoStore`]).

pub mod client;
pub mod dynamodb;
pub mod s3;

pub use client::load_sdk_config;
pub use dynamodb::DynamoStore;
pub use s3::TransferManager;
