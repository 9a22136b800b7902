//! CloudWatch Logs: stream discovery, history backfill and live tail.

use anyhow::{Context, Result};
use aws_sdk_cloudwatchlogs::operation::start_live_tail::StartLiveTailOutput;
use aws_sdk_cloudwatchlogs::types::{LogStream, OrderBy, OutputLogEvent};
use chrono::{DateTime, Duration, Utc};

use super::AwsClient;
use crate::ui::utils::shorten_arn;

/// Streams without events in this many days are ignored.
const RECENT_DAYS: i64 = 3;

/// Which streams of a log group are relevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFilter {
    /// Every recent stream, used for Lambda and API Gateway groups.
    Any,
    /// Only the streams of one ECS container in one task.
    Container { task_arn: String, prefix: String },
}

/// Builds the ARN of a log group, as required by StartLiveTail.
pub fn log_group_arn(region: &str, account: &str, log_group: &str) -> String {
    format!("arn:aws:logs:{region}:{account}:log-group:{log_group}")
}

/// Whether a stream received an event within the last three days.
pub fn stream_is_recent(stream: &LogStream, now: DateTime<Utc>) -> bool {
    let cutoff = (now - Duration::days(RECENT_DAYS)).timestamp_millis();
    stream
        .last_event_timestamp()
        .is_some_and(|last| last > cutoff)
}

/// Whether a stream passes the filter. Recency is checked separately.
pub fn stream_matches(stream: &LogStream, filter: &StreamFilter) -> bool {
    match filter {
        StreamFilter::Any => true,
        StreamFilter::Container { task_arn, prefix } => {
            let name = stream.log_stream_name().unwrap_or_default();
            name.contains(shorten_arn(task_arn)) && name.contains(prefix.as_str())
        }
    }
}

impl AwsClient {
    /// Finds the recently written streams of a log group.
    ///
    /// Looks at the `limit` streams with the latest events and keeps those that
    /// were written to in the last three days and match `filter`.
    ///
    /// # Errors
    /// Fails when DescribeLogStreams fails, e.g. the group does not exist.
    pub async fn log_streams(
        &self,
        log_group: &str,
        filter: &StreamFilter,
        limit: i32,
    ) -> Result<Vec<String>> {
        let resp = self
            .logs
            .describe_log_streams()
            .log_group_name(log_group)
            .order_by(OrderBy::LastEventTime)
            .descending(true)
            .limit(limit)
            .send()
            .await
            .with_context(|| format!("Failed to look up log streams for {log_group}"))?;

        let now = Utc::now();
        let streams: Vec<String> = resp
            .log_streams()
            .iter()
            .filter(|stream| stream_is_recent(stream, now) && stream_matches(stream, filter))
            .filter_map(|stream| stream.log_stream_name().map(str::to_string))
            .collect();

        tracing::info!("Found {} log streams in {}", streams.len(), log_group);
        Ok(streams)
    }

    /// Reads the events of a stream written since `since`, oldest first.
    ///
    /// GetLogEvents signals the end of the stream by returning the token it was
    /// given, so pages are read until the forward token repeats.
    ///
    /// # Errors
    /// Fails when any GetLogEvents page fails.
    pub async fn log_events(
        &self,
        log_group: &str,
        log_stream: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<OutputLogEvent>> {
        let mut events = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .logs
                .get_log_events()
                .log_group_name(log_group)
                .log_stream_name(log_stream)
                .start_time(since.timestamp_millis())
                .start_from_head(true)
                .set_next_token(next_token.clone())
                .send()
                .await
                .with_context(|| format!("Failed to read log events from {log_stream}"))?;

            events.extend(resp.events().iter().cloned());

            let forward = resp.next_forward_token().map(str::to_string);
            if forward.is_none() || forward == next_token {
                break;
            }
            next_token = forward;
        }

        Ok(events)
    }

    /// Starts a live tail session on a single stream.
    ///
    /// The returned output owns the event receiver; dropping it ends the session.
    ///
    /// # Errors
    /// Fails when StartLiveTail is rejected.
    pub async fn start_live_tail(
        &self,
        log_group_arn: &str,
        log_stream: &str,
    ) -> Result<StartLiveTailOutput> {
        self.logs
            .start_live_tail()
            .log_group_identifiers(log_group_arn)
            .log_stream_names(log_stream)
            .send()
            .await
            .with_context(|| format!("Failed to start live tail for {log_stream}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(name: &str, last_event: Option<i64>) -> LogStream {
        LogStream::builder()
            .log_stream_name(name)
            .set_last_event_timestamp(last_event)
            .build()
    }

    #[test]
    fn test_log_group_arn() {
        assert_eq!(
            log_group_arn("eu-west-1", "123456789012", "/ecs/orders"),
            "arn:aws:logs:eu-west-1:123456789012:log-group:/ecs/orders"
        );
    }

    #[test]
    fn test_stream_is_recent() {
        let now = Utc::now();
        let hour_ago = (now - Duration::hours(1)).timestamp_millis();
        let week_ago = (now - Duration::days(7)).timestamp_millis();

        assert!(stream_is_recent(&stream("a", Some(hour_ago)), now));
        assert!(!stream_is_recent(&stream("b", Some(week_ago)), now));
        assert!(!stream_is_recent(&stream("c", None), now));
    }

    #[test]
    fn test_stream_matches_any() {
        assert!(stream_matches(&stream("2024/01/01/[$LATEST]abc", None), &StreamFilter::Any));
    }

    #[test]
    fn test_stream_matches_container() {
        let filter = StreamFilter::Container {
            task_arn: "arn:aws:ecs:eu-west-1:123456789012:task/prod/0f1e2d3c".to_string(),
            prefix: "web".to_string(),
        };

        assert!(stream_matches(&stream("web/app/0f1e2d3c", None), &filter));
        assert!(!stream_matches(&stream("web/app/99999999", None), &filter));
        assert!(!stream_matches(&stream("worker/app/0f1e2d3c", None), &filter));
    }
}
