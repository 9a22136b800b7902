//! Container Insights CPU and memory usage for ECS services.

use anyhow::{Context, Result};
use aws_sdk_cloudwatch::primitives::DateTime as SdkDateTime;
use aws_sdk_cloudwatch::types::{Dimension, Metric, MetricDataQuery, MetricDataResult, MetricStat};
use chrono::{Duration, Utc};

use super::AwsClient;

const NAMESPACE: &str = "ECS/ContainerInsights";
const PERIOD_SECONDS: i32 = 60;
const WINDOW_MINUTES: i64 = 10;

/// Query ids and the Container Insights metric each one reads.
pub const USAGE_METRICS: [(&str, &str); 4] = [
    ("mem_used", "MemoryUtilized"),
    ("mem_reserved", "MemoryReserved"),
    ("cpu_used", "CpuUtilized"),
    ("cpu_reserved", "CpuReserved"),
];

/// Average CPU units and memory (MiB) used and reserved by a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceUsage {
    pub memory_used: u32,
    pub memory_reserved: u32,
    pub cpu_used: u32,
    pub cpu_reserved: u32,
}

/// Builds the query for one Container Insights metric of a service.
pub fn usage_query(id: &str, metric_name: &str, service: &str, cluster: &str) -> MetricDataQuery {
    let metric = Metric::builder()
        .namespace(NAMESPACE)
        .metric_name(metric_name)
        .dimensions(Dimension::builder().name("TaskDefinitionFamily").value(service).build())
        .dimensions(Dimension::builder().name("ClusterName").value(cluster).build())
        .build();

    MetricDataQuery::builder()
        .id(id)
        .metric_stat(
            MetricStat::builder()
                .metric(metric)
                .period(PERIOD_SECONDS)
                .stat("Average")
                .build(),
        )
        .build()
}

/// Averages the returned series.
///
/// Every series is summed and divided by the number of CpuReserved datapoints,
/// so all four values share one denominator. No datapoints means all zeros.
pub fn average_usage(results: &[MetricDataResult]) -> ServiceUsage {
    let mut sums = ServiceUsage::default();
    let mut datapoints = 0u32;

    for result in results {
        for value in result.values() {
            let value = *value as u32;
            match result.id().unwrap_or_default() {
                "mem_used" => sums.memory_used += value,
                "mem_reserved" => sums.memory_reserved += value,
                "cpu_used" => sums.cpu_used += value,
                "cpu_reserved" => {
                    sums.cpu_reserved += value;
                    datapoints += 1;
                }
                _ => {}
            }
        }
    }

    if datapoints == 0 {
        return ServiceUsage::default();
    }

    ServiceUsage {
        memory_used: sums.memory_used / datapoints,
        memory_reserved: sums.memory_reserved / datapoints,
        cpu_used: sums.cpu_used / datapoints,
        cpu_reserved: sums.cpu_reserved / datapoints,
    }
}

impl AwsClient {
    /// Reads the average CPU and memory usage of a service over the last ten minutes.
    ///
    /// # Arguments
    /// * `cluster` - Cluster name, used as the ClusterName dimension
    /// * `service` - Service name, used as the TaskDefinitionFamily dimension
    ///
    /// # Errors
    /// Fails when GetMetricData fails.
    pub async fn service_usage(&self, cluster: &str, service: &str) -> Result<ServiceUsage> {
        let end = Utc::now();
        let start = end - Duration::minutes(WINDOW_MINUTES);

        let queries = USAGE_METRICS
            .iter()
            .map(|(id, metric_name)| usage_query(id, metric_name, service, cluster))
            .collect();

        let resp = self
            .metrics
            .get_metric_data()
            .set_metric_data_queries(Some(queries))
            .start_time(SdkDateTime::from_secs(start.timestamp()))
            .end_time(SdkDateTime::from_secs(end.timestamp()))
            .send()
            .await
            .with_context(|| format!("Failed to fetch CloudWatch metrics for {service}"))?;

        Ok(average_usage(resp.metric_data_results()))
    }
}
