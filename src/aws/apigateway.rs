//! API Gateway: HTTP APIs (v2), REST APIs (v1) and their custom domains.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::{to_utc, AwsClient};

/// Which API Gateway flavour an API belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiType {
    Http,
    Rest,
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiType::Http => write!(f, "Http"),
            ApiType::Rest => write!(f, "Rest"),
        }
    }
}

/// An API Gateway API as shown in the APIs table.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiGateway {
    pub name: String,
    pub id: String,
    /// Custom domain mapped to the API, empty when there is none.
    pub domain_name: String,
    pub api_type: ApiType,
    pub created_at: Option<DateTime<Utc>>,
    pub description: String,
}

impl ApiGateway {
    /// Access log group, following the `/aws/apigateway/{name}` convention.
    pub fn log_group(&self) -> String {
        format!("/aws/apigateway/{}", self.name)
    }
}

impl AwsClient {
    /// Lists HTTP and REST APIs, each joined to its custom domain.
    ///
    /// Every part is fetched independently. A failing call is logged and its
    /// part left out, so a missing permission for one API flavour still shows
    /// the other.
    pub async fn list_apis(&self) -> Vec<ApiGateway> {
        let domains = match self.api_domains().await {
            Ok(domains) => domains,
            Err(e) => {
                tracing::error!("Failed to read API Gateway domain names: {:#}", e);
                HashMap::new()
            }
        };

        let mut apis = Vec::new();

        match self.http_apis(&domains).await {
            Ok(http) => apis.extend(http),
            Err(e) => tracing::error!("Failed to read HTTP APIs: {:#}", e),
        }

        match self.rest_apis(&domains).await {
            Ok(rest) => apis.extend(rest),
            Err(e) => tracing::error!("Failed to read REST APIs: {:#}", e),
        }

        tracing::debug!("Found {} APIs", apis.len());
        apis
    }

    /// Maps API ids to the custom domain whose first mapping points at them.
    async fn api_domains(&self) -> Result<HashMap<String, String>> {
        let mut domain_names = Vec::new();
        let mut next_token = None;

        loop {
            let resp = self
                .http_apis
                .get_domain_names()
                .set_next_token(next_token)
                .send()
                .await
                .context("Failed to list domain names")?;

            domain_names.extend(
                resp.items()
                    .iter()
                    .filter_map(|domain| domain.domain_name().map(str::to_string)),
            );
            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        let mut mapping = HashMap::new();
        for domain in domain_names {
            let resp = match self
                .http_apis
                .get_api_mappings()
                .domain_name(&domain)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::error!("Failed to read API mappings for domain {}: {}", domain, e);
                    continue;
                }
            };

            if let Some(api_id) = resp.items().first().and_then(|m| m.api_id()) {
                mapping.insert(api_id.to_string(), domain);
            }
        }

        Ok(mapping)
    }

    async fn http_apis(&self, domains: &HashMap<String, String>) -> Result<Vec<ApiGateway>> {
        let mut apis = Vec::new();
        let mut next_token = None;

        loop {
            let resp = self
                .http_apis
                .get_apis()
                .set_next_token(next_token)
                .send()
                .await
                .context("Failed to list HTTP APIs")?;

            for api in resp.items() {
                let id = api.api_id().unwrap_or_default().to_string();
                apis.push(ApiGateway {
                    name: api.name().unwrap_or_default().to_string(),
                    domain_name: domains.get(&id).cloned().unwrap_or_default(),
                    id,
                    api_type: ApiType::Http,
                    created_at: api.created_date().and_then(to_utc),
                    description: api.description().unwrap_or_default().to_string(),
                });
            }

            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        Ok(apis)
    }

    async fn rest_apis(&self, domains: &HashMap<String, String>) -> Result<Vec<ApiGateway>> {
        let mut apis = Vec::new();
        let mut position = None;

        loop {
            let resp = self
                .rest_apis
                .get_rest_apis()
                .set_position(position)
                .send()
                .await
                .context("Failed to list REST APIs")?;

            for api in resp.items() {
                let id = api.id().unwrap_or_default().to_string();
                apis.push(ApiGateway {
                    name: api.name().unwrap_or_default().to_string(),
                    domain_name: domains.get(&id).cloned().unwrap_or_default(),
                    id,
                    api_type: ApiType::Rest,
                    created_at: api.created_date().and_then(to_utc),
                    description: api.description().unwrap_or_default().to_string(),
                });
            }

            position = resp.position().map(str::to_string);
            if position.is_none() {
                break;
            }
        }

        Ok(apis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_type_display() {
        assert_eq!(ApiType::Http.to_string(), "Http");
        assert_eq!(ApiType::Rest.to_string(), "Rest");
    }

    #[test]
    fn test_api_log_group() {
        let api = ApiGateway {
            name: "orders-api".to_string(),
            id: "a1b2c3".to_string(),
            domain_name: String::new(),
            api_type: ApiType::Rest,
            created_at: None,
            description: String::new(),
        };
        assert_eq!(api.log_group(), "/aws/apigateway/orders-api");
    }
}
