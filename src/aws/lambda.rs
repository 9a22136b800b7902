//! Lambda and S3 operations: listing functions, restarting and deploying them.

use std::collections::HashMap;

use anyhow::{Context, Result};
use aws_sdk_lambda::types::{Architecture, FunctionConfiguration};

use super::AwsClient;

/// Tag written on a function after a deploy.
pub const LAST_DEPLOYED_TAG: &str = "LastDeployed";

impl AwsClient {
    /// Lists all Lambda functions in the region, sorted by name.
    ///
    /// # Errors
    /// Fails when any ListFunctions page fails.
    pub async fn list_functions(&self) -> Result<Vec<FunctionConfiguration>> {
        let mut functions = Vec::new();
        let mut marker = None;

        loop {
            let resp = self
                .lambda
                .list_functions()
                .set_marker(marker)
                .send()
                .await
                .context("Failed to list Lambda functions")?;

            functions.extend(resp.functions().iter().cloned());
            marker = resp.next_marker().map(str::to_string);
            if marker.is_none() {
                break;
            }
        }

        functions.sort_by(|a, b| a.function_name().cmp(&b.function_name()));
        Ok(functions)
    }

    /// Returns the tags of a function.
    ///
    /// # Errors
    /// Fails when GetFunction fails.
    pub async fn function_tags(&self, function_name: &str) -> Result<HashMap<String, String>> {
        let resp = self
            .lambda
            .get_function()
            .function_name(function_name)
            .send()
            .await
            .with_context(|| format!("Failed to get function {function_name}"))?;

        Ok(resp.tags().cloned().unwrap_or_default())
    }

    /// Forces Lambda to start fresh execution environments.
    ///
    /// Lambda has no restart call, so the description is changed instead: a
    /// trailing `.` is removed when present and appended otherwise.
    ///
    /// # Errors
    /// Fails when reading or updating the function configuration fails.
    pub async fn restart_function(&self, function_name: &str) -> Result<()> {
        let resp = self
            .lambda
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .with_context(|| format!("Failed to read configuration of {function_name}"))?;

        let description = toggle_trailing_dot(resp.description().unwrap_or_default());

        self.lambda
            .update_function_configuration()
            .function_name(function_name)
            .description(description)
            .send()
            .await
            .with_context(|| format!("Failed to update description of {function_name}"))?;

        Ok(())
    }

    /// Lists the deployable versions stored for a function in the deployment bucket.
    ///
    /// Objects are expected under `{function}/{version}`; the returned names are
    /// the part after the first `/`.
    ///
    /// # Errors
    /// Fails when ListObjectsV2 fails.
    pub async fn available_versions(&self, bucket: &str, function_name: &str) -> Result<Vec<String>> {
        let mut versions = Vec::new();
        let mut continuation = None;

        loop {
            let resp = self
                .s3
                .list_objects_v2()
                .bucket(bucket)
                .prefix(function_name)
                .set_continuation_token(continuation)
                .send()
                .await
                .with_context(|| format!("Failed to list versions of {function_name} in {bucket}"))?;

            versions.extend(
                resp.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(version_from_key),
            );

            continuation = resp.next_continuation_token().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }

        Ok(versions)
    }

    /// Deploys a version from the deployment bucket and tags the function with it.
    ///
    /// # Errors
    /// Fails when UpdateFunctionCode or TagResource fails.
    pub async fn deploy_function(
        &self,
        function_name: &str,
        version: &str,
        bucket: &str,
        architecture: Option<Architecture>,
    ) -> Result<()> {
        let key = format!("{function_name}/{version}");

        let resp = self
            .lambda
            .update_function_code()
            .function_name(function_name)
            .s3_bucket(bucket)
            .s3_key(&key)
            .set_architectures(architecture.map(|arch| vec![arch]))
            .send()
            .await
            .with_context(|| format!("Failed to update {function_name} to version {version}"))?;

        let function_arn = resp
            .function_arn()
            .context("UpdateFunctionCode returned no function ARN")?;

        self.lambda
            .tag_resource()
            .resource(function_arn)
            .tags(LAST_DEPLOYED_TAG, version)
            .send()
            .await
            .with_context(|| format!("Failed to tag {function_name} with version {version}"))?;

        Ok(())
    }
}

/// Removes a trailing `.` if there is one, otherwise adds one.
pub fn toggle_trailing_dot(description: &str) -> String {
    match description.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => format!("{description}."),
    }
}

/// Returns everything after the first `/` of an S3 key, or the key itself.
pub fn version_from_key(key: &str) -> String {
    match key.split_once('/') {
        Some((_, version)) => version.to_string(),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_trailing_dot_adds() {
        assert_eq!(toggle_trailing_dot("My function"), "My function.");
        assert_eq!(toggle_trailing_dot(""), ".");
    }

    #[test]
    fn test_toggle_trailing_dot_removes() {
        assert_eq!(toggle_trailing_dot("My function."), "My function");
        assert_eq!(toggle_trailing_dot("."), "");
    }

    #[test]
    fn test_toggle_trailing_dot_twice_restores() {
        let original = "Handles orders";
        assert_eq!(toggle_trailing_dot(&toggle_trailing_dot(original)), original);
    }

    #[test]
    fn test_version_from_key() {
        assert_eq!(version_from_key("orders/1.4.2.zip"), "1.4.2.zip");
        assert_eq!(version_from_key("orders/builds/abc.zip"), "builds/abc.zip");
        assert_eq!(version_from_key("orders"), "orders");
    }
}
