//! ECS operations: clusters, services, task definitions, tasks and exec sessions.

use anyhow::{Context, Result};
use aws_sdk_ecs::types::{Cluster, ClusterField, Service, Task, TaskDefinition};

use super::AwsClient;
use crate::shell::ExecSession;
use crate::ui::utils::shorten_arn;

/// DescribeServices accepts at most this many services per call.
const DESCRIBE_SERVICES_CHUNK: usize = 10;
/// DescribeTasks accepts at most this many tasks per call.
const DESCRIBE_TASKS_CHUNK: usize = 100;

/// Orders tasks by their short task definition name, e.g. `orders:41` before `orders:42`.
fn sort_by_revision(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        let a = shorten_arn(a.task_definition_arn().unwrap_or_default());
        let b = shorten_arn(b.task_definition_arn().unwrap_or_default());
        a.cmp(b)
    });
}

impl AwsClient {
    /// Lists every ECS cluster in the region with its statistics.
    ///
    /// # Returns
    /// Full cluster descriptions in the order ListClusters returned them, or an
    /// empty vector when the account has no clusters.
    ///
    /// # Errors
    /// Fails when ListClusters or DescribeClusters fails.
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let mut cluster_arns = Vec::new();
        let mut next_token = None;

        loop {
            let resp = self
                .ecs
                .list_clusters()
                .set_next_token(next_token)
                .send()
                .await
                .context("Failed to list ECS clusters")?;

            cluster_arns.extend(resp.cluster_arns().iter().cloned());
            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        if cluster_arns.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .ecs
            .describe_clusters()
            .set_clusters(Some(cluster_arns))
            .include(ClusterField::Statistics)
            .send()
            .await
            .context("Failed to describe ECS clusters")?;

        Ok(resp.clusters().to_vec())
    }

    /// Describes all services in a cluster, sorted by service name.
    ///
    /// Service ARNs are listed page by page and then described in chunks of ten,
    /// which is the DescribeServices limit.
    ///
    /// # Errors
    /// Fails when ListServices or any DescribeServices call fails.
    pub async fn describe_services(&self, cluster: &str) -> Result<Vec<Service>> {
        let mut service_arns = Vec::new();
        let mut next_token = None;

        loop {
            let resp = self
                .ecs
                .list_services()
                .cluster(cluster)
                .set_next_token(next_token)
                .send()
                .await
                .with_context(|| format!("Failed to list services in cluster {cluster}"))?;

            service_arns.extend(resp.service_arns().iter().cloned());
            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        let mut services = Vec::with_capacity(service_arns.len());
        for chunk in service_arns.chunks(DESCRIBE_SERVICES_CHUNK) {
            let resp = self
                .ecs
                .describe_services()
                .cluster(cluster)
                .set_services(Some(chunk.to_vec()))
                .send()
                .await
                .with_context(|| format!("Failed to describe services in cluster {cluster}"))?;
            services.extend(resp.services().iter().cloned());
        }

        services.sort_by(|a, b| a.service_name().cmp(&b.service_name()));
        Ok(services)
    }

    /// Fetches a single task definition by ARN or `family:revision`.
    ///
    /// # Errors
    /// Fails when DescribeTaskDefinition fails or returns nothing.
    pub async fn task_definition(&self, task_definition: &str) -> Result<TaskDefinition> {
        let resp = self
            .ecs
            .describe_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .with_context(|| format!("Failed to describe task definition {task_definition}"))?;

        resp.task_definition()
            .cloned()
            .with_context(|| format!("Task definition {task_definition} not found"))
    }

    /// Fetches several task definitions, skipping duplicates.
    ///
    /// # Errors
    /// Fails on the first task definition that cannot be described.
    pub async fn task_definitions(&self, arns: &[String]) -> Result<Vec<TaskDefinition>> {
        let mut seen = std::collections::HashSet::new();
        let mut definitions = Vec::with_capacity(arns.len());
        for arn in arns {
            if seen.insert(arn.as_str()) {
                definitions.push(self.task_definition(arn).await?);
            }
        }
        Ok(definitions)
    }

    /// Lists the tasks of a service, sorted by task definition revision.
    ///
    /// Task ARNs are listed page by page and described in chunks of 100, the
    /// DescribeTasks limit.
    ///
    /// # Errors
    /// Fails when ListTasks or any DescribeTasks call fails.
    pub async fn describe_tasks(&self, cluster: &str, service: &str) -> Result<Vec<Task>> {
        let mut task_arns = Vec::new();
        let mut next_token = None;

        loop {
            let resp = self
                .ecs
                .list_tasks()
                .cluster(cluster)
                .service_name(service)
                .set_next_token(next_token)
                .send()
                .await
                .with_context(|| format!("Failed to list tasks for service {service}"))?;

            task_arns.extend(resp.task_arns().iter().cloned());
            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        let mut tasks = Vec::with_capacity(task_arns.len());
        for chunk in task_arns.chunks(DESCRIBE_TASKS_CHUNK) {
            let resp = self
                .ecs
                .describe_tasks()
                .cluster(cluster)
                .set_tasks(Some(chunk.to_vec()))
                .send()
                .await
                .with_context(|| format!("Failed to describe tasks for service {service}"))?;
            tasks.extend(resp.tasks().iter().cloned());
        }

        sort_by_revision(&mut tasks);
        Ok(tasks)
    }

    /// Forces a new deployment of a service, restarting all tasks.
    ///
    /// # Errors
    /// Fails when UpdateService fails, e.g. insufficient permissions.
    pub async fn restart_service(&self, cluster: &str, service: &str) -> Result<()> {
        self.ecs
            .update_service()
            .cluster(cluster)
            .service(service)
            .force_new_deployment(true)
            .send()
            .await
            .with_context(|| format!("Failed to restart service {service}"))?;

        Ok(())
    }

    /// Starts an interactive `/bin/sh` exec session in a running container.
    ///
    /// # Returns
    /// The session handle that `session-manager-plugin` needs to connect.
    ///
    /// # Errors
    /// Fails when ExecuteCommand fails (exec not enabled on the service, missing
    /// permissions) or returns no session.
    pub async fn execute_command(
        &self,
        cluster: &str,
        task_arn: &str,
        container: &str,
    ) -> Result<ExecSession> {
        let resp = self
            .ecs
            .execute_command()
            .cluster(cluster)
            .task(task_arn)
            .container(container)
            .command("/bin/sh")
            .interactive(true)
            .send()
            .await
            .with_context(|| format!("Failed to execute command in container {container}"))?;

        let session = resp
            .session()
            .context("ExecuteCommand returned no session")?;

        Ok(ExecSession {
            session_id: session.session_id().unwrap_or_default().to_string(),
            stream_url: session.stream_url().unwrap_or_default().to_string(),
            token_value: session.token_value().unwrap_or_default().to_string(),
        })
    }
}
