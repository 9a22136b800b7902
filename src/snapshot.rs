//! Point-in-time view of the account: ECS services, Lambda functions and APIs.
//!
//! A snapshot is assembled in one go by [`load_snapshot`] and never mutated
//! afterwards. Refreshing builds a new snapshot and swaps it into the
//! [`SharedSnapshot`], so every reader sees either the old view or the new one.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{bail, Result};
use aws_sdk_ecs::types::{ContainerDefinition, Service, Task, TaskDefinition};
use aws_sdk_lambda::types::FunctionConfiguration;
use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::aws::{ApiGateway, AwsClient, ServiceUsage, LAST_DEPLOYED_TAG};
use crate::github::{Deployable, GithubClient};
use crate::ui::utils::{shorten_arn, take_left, MAX_IMAGE_WIDTH};

#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub cluster_name: String,
    pub refreshed_at: DateTime<Utc>,
    pub services: Vec<ServiceData>,
    pub functions: Vec<Function>,
    pub apis: Vec<ApiGateway>,
}

impl AccountSnapshot {
    /// A snapshot with no resources, shown before the first load completes.
    pub fn empty(account_id: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            cluster_name: cluster_name.into(),
            refreshed_at: Utc::now(),
            services: Vec::new(),
            functions: Vec::new(),
            apis: Vec::new(),
        }
    }
}

/// An ECS service joined with the containers of its task definition.
#[derive(Debug, Clone)]
pub struct ServiceData {
    pub service: Service,
    pub containers: Vec<Container>,
}

impl ServiceData {
    pub fn name(&self) -> &str {
        self.service.service_name().unwrap_or_default()
    }

    /// Short task definition name, e.g. `orders:42`.
    pub fn task_definition(&self) -> &str {
        shorten_arn(self.service.task_definition().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub truncated_image: String,
    pub log_stream_prefix: String,
    pub log_group: String,
}

impl Container {
    /// Builds a container from its definition in the task definition of `service`.
    pub fn from_definition(definition: &ContainerDefinition, service: &str) -> Self {
        let options = definition
            .log_configuration()
            .and_then(|config| config.options());
        let option = |key: &str| options.and_then(|o| o.get(key)).cloned();

        Self {
            name: definition.name().unwrap_or_default().to_string(),
            truncated_image: take_left(
                shorten_arn(definition.image().unwrap_or_default()),
                MAX_IMAGE_WIDTH,
            ),
            log_stream_prefix: option("awslogs-stream-prefix").unwrap_or_default(),
            log_group: option("awslogs-group").unwrap_or_else(|| format!("/ecs/{service}")),
        }
    }
}

/// A Lambda function with its tags.
#[derive(Debug, Clone)]
pub struct Function {
    pub configuration: FunctionConfiguration,
    pub tags: HashMap<String, String>,
}

impl Function {
    pub fn name(&self) -> &str {
        self.configuration.function_name().unwrap_or_default()
    }

    pub fn log_group(&self) -> String {
        format!("/aws/lambda/{}", self.name())
    }

    /// Version recorded by the last deploy from this dashboard.
    pub fn last_deployed(&self) -> Option<&str> {
        self.tags.get(LAST_DEPLOYED_TAG).map(String::as_str)
    }
}

/// Data shown on the service detail page, loaded when the page opens.
#[derive(Debug, Clone, Default)]
pub struct ServiceDetail {
    pub tasks: Vec<Task>,
    pub usage: ServiceUsage,
    pub deployables: Vec<Deployable>,
}

impl ServiceDetail {
    /// Every running container of every task, in task order.
    pub fn containers(&self) -> Vec<(&Task, &aws_sdk_ecs::types::Container)> {
        self.tasks
            .iter()
            .flat_map(|task| task.containers().iter().map(move |c| (task, c)))
            .collect()
    }
}

/// Holder of the current snapshot.
///
/// Readers clone the `Arc` and keep a consistent view for as long as they hold
/// it; a refresh replaces the pointer as a whole.
#[derive(Debug)]
pub struct SharedSnapshot(RwLock<Arc<AccountSnapshot>>);

impl SharedSnapshot {
    pub fn new(snapshot: AccountSnapshot) -> Self {
        Self(RwLock::new(Arc::new(snapshot)))
    }

    pub fn load(&self) -> Arc<AccountSnapshot> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in a new snapshot and returns the previous one.
    pub fn replace(&self, snapshot: AccountSnapshot) -> Arc<AccountSnapshot> {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(snapshot))
    }
}

/// Picks the cluster to show: the named one, or the first when no name is given.
pub fn select_cluster(cluster_names: &[String], wanted: Option<&str>) -> Result<String> {
    match wanted {
        Some(name) => match cluster_names.iter().find(|c| c.as_str() == name) {
            Some(found) => Ok(found.clone()),
            None => bail!("ECS cluster {name} not found in this account and region"),
        },
        None => match cluster_names.first() {
            Some(first) => Ok(first.clone()),
            None => bail!("No ECS clusters found in this account and region"),
        },
    }
}

/// Joins services with the containers of their task definitions.
pub fn join_services(services: Vec<Service>, definitions: &[TaskDefinition]) -> Vec<ServiceData> {
    let by_arn: HashMap<&str, &TaskDefinition> = definitions
        .iter()
        .filter_map(|td| td.task_definition_arn().map(|arn| (arn, td)))
        .collect();

    services
        .into_iter()
        .map(|service| {
            let name = service.service_name().unwrap_or_default().to_string();
            let containers = service
                .task_definition()
                .and_then(|arn| by_arn.get(arn))
                .map(|td| {
                    td.container_definitions()
                        .iter()
                        .map(|def| Container::from_definition(def, &name))
                        .collect()
                })
                .unwrap_or_default();

            ServiceData {
                service,
                containers,
            }
        })
        .collect()
}

/// Builds a complete snapshot of the account.
///
/// # Errors
/// Fails when the caller identity cannot be determined, the account has no
/// (matching) cluster, or ECS services cannot be loaded. Lambda and API
/// Gateway failures are logged and leave those lists empty.
pub async fn load_snapshot(client: &AwsClient, cluster_override: Option<&str>) -> Result<AccountSnapshot> {
    let account_id = client.caller_account().await?;

    let cluster_names: Vec<String> = client
        .list_clusters()
        .await?
        .iter()
        .filter_map(|c| c.cluster_name().map(str::to_string))
        .collect();
    let cluster_name = select_cluster(&cluster_names, cluster_override)?;

    let (services, functions, apis) = tokio::join!(
        load_services(client, &cluster_name),
        load_functions(client),
        client.list_apis(),
    );

    let functions = functions.unwrap_or_else(|e| {
        tracing::error!("Failed to load Lambda functions: {:#}", e);
        Vec::new()
    });

    let snapshot = AccountSnapshot {
        account_id,
        cluster_name,
        refreshed_at: Utc::now(),
        services: services?,
        functions,
        apis,
    };

    tracing::info!(
        "Loaded snapshot: {} services, {} functions, {} APIs",
        snapshot.services.len(),
        snapshot.functions.len(),
        snapshot.apis.len()
    );
    Ok(snapshot)
}

async fn load_services(client: &AwsClient, cluster: &str) -> Result<Vec<ServiceData>> {
    let services = client.describe_services(cluster).await?;
    let arns: Vec<String> = services
        .iter()
        .filter_map(|s| s.task_definition().map(str::to_string))
        .collect();
    let definitions = client.task_definitions(&arns).await?;
    Ok(join_services(services, &definitions))
}

async fn load_functions(client: &AwsClient) -> Result<Vec<Function>> {
    let configurations = client.list_functions().await?;

    let tags = join_all(configurations.iter().map(|f| async move {
        let name = f.function_name().unwrap_or_default();
        client.function_tags(name).await.unwrap_or_else(|e| {
            tracing::error!("Failed to read tags of function {}: {:#}", name, e);
            HashMap::new()
        })
    }))
    .await;

    Ok(configurations
        .into_iter()
        .zip(tags)
        .map(|(configuration, tags)| Function { configuration, tags })
        .collect())
}

/// Loads tasks, usage and deployables of a service.
///
/// Only the task list is required; usage falls back to zeros and the
/// deployables to an empty list when they cannot be read.
///
/// # Errors
/// Fails when the tasks of the service cannot be listed.
pub async fn load_service_detail(
    client: &AwsClient,
    github: Option<&GithubClient>,
    cluster: &str,
    service: &str,
) -> Result<ServiceDetail> {
    let deployables = async {
        match github {
            Some(github) => github.deployables(service).await.unwrap_or_else(|e| {
                tracing::error!("Failed to read deployables for {}: {}", service, e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    };

    let (tasks, usage, deployables) = tokio::join!(
        client.describe_tasks(cluster, service),
        client.service_usage(cluster, service),
        deployables,
    );

    let usage = usage.unwrap_or_else(|e| {
        tracing::error!("Failed to read usage for {}: {:#}", service, e);
        ServiceUsage::default()
    });

    Ok(ServiceDetail {
        tasks: tasks?,
        usage,
        deployables,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use aws_sdk_ecs::types::{LogConfiguration, LogDriver};

    fn definition(name: &str, image: &str, options: &[(&str, &str)]) -> ContainerDefinition {
        let mut log = LogConfiguration::builder().log_driver(LogDriver::Awslogs);
        for (k, v) in options {
            log = log.options(*k, *v);
        }
        ContainerDefinition::builder()
            .name(name)
            .image(image)
            .log_configuration(log.build().unwrap())
            .build()
    }

    #[test]
    fn test_container_from_definition() {
        let def = definition(
            "web",
            "123456789012.dkr.ecr.eu-west-1.amazonaws.com/team/orders:1.2.3",
            &[("awslogs-group", "/custom/orders"), ("awslogs-stream-prefix", "web")],
        );
        let container = Container::from_definition(&def, "orders");

        assert_eq!(container.name, "web");
        assert_eq!(container.truncated_image, "orders:1.2.3");
        assert_eq!(container.log_stream_prefix, "web");
        assert_eq!(container.log_group, "/custom/orders");
    }

    #[test]
    fn test_container_log_group_fallback() {
        let def = definition("web", "nginx", &[]);
        let container = Container::from_definition(&def, "orders");
        assert_eq!(container.log_group, "/ecs/orders");
        assert_eq!(container.log_stream_prefix, "");
    }

    #[test]
    fn test_container_image_truncated() {
        let long = format!("ghcr.io/acme/{}", "x".repeat(80));
        let def = definition("web", &long, &[]);
        let container = Container::from_definition(&def, "orders");
        assert_eq!(container.truncated_image.chars().count(), MAX_IMAGE_WIDTH);
        assert!(container.truncated_image.ends_with('…'));
    }

    #[test]
    fn test_join_services() {
        let td_arn = "arn:aws:ecs:eu-west-1:123456789012:task-definition/orders:7";
        let services = vec![
            Service::builder()
                .service_name("orders")
                .task_definition(td_arn)
                .build(),
            Service::builder()
                .service_name("orphan")
                .task_definition("arn:missing")
                .build(),
        ];
        let definitions = vec![TaskDefinition::builder()
            .task_definition_arn(td_arn)
            .container_definitions(definition("web", "nginx", &[]))
            .container_definitions(definition("sidecar", "envoy", &[]))
            .build()];

        let joined = join_services(services, &definitions);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].name(), "orders");
        assert_eq!(joined[0].task_definition(), "orders:7");
        assert_eq!(joined[0].containers.len(), 2);
        assert_eq!(joined[0].containers[1].name, "sidecar");
        assert!(joined[1].containers.is_empty());
    }

    #[test]
    fn test_select_cluster() {
        let names = vec!["prod".to_string(), "staging".to_string()];
        assert_eq!(select_cluster(&names, None).unwrap(), "prod");
        assert_eq!(select_cluster(&names, Some("staging")).unwrap(), "staging");
        assert!(select_cluster(&names, Some("dev")).is_err());
        assert!(select_cluster(&[], None).is_err());
    }

    #[test]
    fn test_function_helpers() {
        let function = Function {
            configuration: FunctionConfiguration::builder()
                .function_name("order-handler")
                .build(),
            tags: HashMap::from([(LAST_DEPLOYED_TAG.to_string(), "1.4.2.zip".to_string())]),
        };
        assert_eq!(function.name(), "order-handler");
        assert_eq!(function.log_group(), "/aws/lambda/order-handler");
        assert_eq!(function.last_deployed(), Some("1.4.2.zip"));
    }

    #[test]
    fn test_shared_snapshot_replace() {
        let shared = SharedSnapshot::new(AccountSnapshot::empty("123", "prod"));
        let before = shared.load();

        let mut next = AccountSnapshot::empty("123", "prod");
        next.apis.push(ApiGateway {
            name: "orders-api".to_string(),
            id: "a1".to_string(),
            domain_name: String::new(),
            api_type: crate::aws::ApiType::Http,
            created_at: None,
            description: String::new(),
        });
        let previous = shared.replace(next);

        assert!(Arc::ptr_eq(&before, &previous));
        assert!(before.apis.is_empty());
        assert_eq!(shared.load().apis.len(), 1);
    }
}
