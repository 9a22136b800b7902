//! AWS integration module.
//!
//! This module provides a client wrapper around the AWS SDK clients used by the
//! dashboard: ECS, Lambda, CloudWatch Logs, CloudWatch metrics, API Gateway
//! (v1 and v2), S3 and STS. Each service has its own submodule adding methods to
//! [`AwsClient`].

mod apigateway;
mod ecs;
mod lambda;
mod logs;
mod metrics;

use anyhow::{Context, Result};
use aws_sdk_apigateway::Client as RestApiClient;
use aws_sdk_apigatewayv2::Client as HttpApiClient;
use aws_sdk_cloudwatch::Client as CloudWatchClient;
use aws_sdk_cloudwatchlogs::Client as LogsClient;
use aws_sdk_ecs::primitives::DateTime as SdkDateTime;
use aws_sdk_ecs::Client as EcsClient;
use aws_sdk_lambda::Client as LambdaClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};

pub use apigateway::{ApiGateway, ApiType};
pub use lambda::{toggle_trailing_dot, version_from_key, LAST_DEPLOYED_TAG};
pub use logs::{log_group_arn, stream_is_recent, stream_matches, StreamFilter};
pub use metrics::{average_usage, usage_query, ServiceUsage, USAGE_METRICS};

/// Client for every AWS service the dashboard talks to.
///
/// The SDK clients are cheap to clone, so the whole wrapper is `Clone` and a copy
/// is handed to each background worker.
#[derive(Clone)]
pub struct AwsClient {
    ecs: EcsClient,
    lambda: LambdaClient,
    logs: LogsClient,
    metrics: CloudWatchClient,
    rest_apis: RestApiClient,
    http_apis: HttpApiClient,
    s3: S3Client,
    sts: StsClient,
    region: String,
}

impl AwsClient {
    /// Creates a new client with optional region and profile overrides.
    ///
    /// # Arguments
    /// * `region` - Optional AWS region override (e.g., "eu-west-1")
    /// * `profile` - Optional AWS profile name from ~/.aws/config
    ///
    /// # Errors
    /// Returns an error if no region can be resolved from the overrides, the
    /// environment or the selected profile.
    pub async fn new(region: Option<String>, profile: Option<String>) -> Result<Self> {
        let mut config_loader = aws_config::from_env();

        if let Some(region_str) = region {
            config_loader = config_loader.region(aws_config::Region::new(region_str));
        }

        if let Some(profile_name) = profile {
            config_loader = config_loader.profile_name(profile_name);
        }

        let config = config_loader.load().await;
        let region = config
            .region()
            .map(|r| r.to_string())
            .context("No AWS region configured (set AWS_REGION or aws.region in the config file)")?;

        Ok(Self {
            ecs: EcsClient::new(&config),
            lambda: LambdaClient::new(&config),
            logs: LogsClient::new(&config),
            metrics: CloudWatchClient::new(&config),
            rest_apis: RestApiClient::new(&config),
            http_apis: HttpApiClient::new(&config),
            s3: S3Client::new(&config),
            sts: StsClient::new(&config),
            region,
        })
    }

    /// The region all clients were configured with.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the account id of the current credentials.
    ///
    /// # Errors
    /// Fails when STS GetCallerIdentity fails (no or expired credentials) or
    /// returns no account.
    pub async fn caller_account(&self) -> Result<String> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .context("Failed to determine caller identity")?;

        identity
            .account()
            .map(str::to_string)
            .context("Caller identity contained no account id")
    }
}

/// Converts an SDK timestamp into a chrono UTC timestamp.
///
/// Every `aws-sdk-*` crate re-exports the same smithy `DateTime`, so this works
/// for timestamps coming from any of the clients.
pub(crate) fn to_utc(dt: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}
