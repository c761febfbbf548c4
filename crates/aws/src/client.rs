//! Shared AWS SDK setup
//!
//! Builds the SDK configuration from [`AwsConfig`] and renders SDK errors.

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use mm_core::config::AwsConfig;

/// Load the SDK configuration
///
/// Unset fields fall back to the default provider chain (environment,
/// profile, instance metadata).
pub async fn load_sdk_config(config: &AwsConfig) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }

    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        let credentials = aws_credential_types::Credentials::new(
            access_key,
            secret_key,
            None, // session token
            None, // expiry
            "mm-static-credentials",
        );
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

/// Format an SDK error into a detailed error message
pub(crate) fn format_sdk_error<E, R>(error: &SdkError<E, R>) -> String
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match error {
        SdkError::ServiceError(service_err) => {
            format!("Service error: {}", DisplayErrorContext(service_err.err()))
        }
        SdkError::ConstructionFailure(err) => {
            format!("Request construction failed: {:?}", err)
        }
        SdkError::TimeoutError(_) => "Request timeout".to_string(),
        SdkError::DispatchFailure(err) => {
            format!("Network dispatch error: {:?}", err)
        }
        SdkError::ResponseError(err) => {
            format!("Response error: {:?}", err)
        }
        _ => DisplayErrorContext(error).to_string(),
    }
}
