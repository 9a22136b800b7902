#![allow(clippy::unwrap_used)]

use aws_voyager::logtail::{split_timestamps, LogView, TailCommand, TailState};

fn subscribed(commands: &[TailCommand]) -> u64 {
    match commands.last() {
        Some(TailCommand::Subscribe { generation, .. }) => *generation,
        other => panic!("expected a subscribe, got {other:?}"),
    }
}

fn view(streams: &[&str], max_lines: usize) -> LogView {
    LogView::new(
        "/aws/lambda/orders",
        "arn:aws:logs:eu-west-1:1:log-group:/aws/lambda/orders",
        streams.iter().map(|s| s.to_string()).collect(),
        max_lines,
    )
}

#[test]
fn test_switching_streams_drops_late_lines() {
    let mut view = view(&["s1", "s2", "s3"], 100);
    let first = subscribed(&view.open().into_iter().collect::<Vec<_>>());
    assert!(view.push_lines(first, vec!["one".to_string()]));

    let commands = view.select(2);
    assert_eq!(commands[0], TailCommand::Unsubscribe);
    let third = subscribed(&commands);
    assert_ne!(first, third);

    // A worker of the first stream may still deliver a batch
    assert!(!view.push_lines(first, vec!["late".to_string()]));
    assert!(view.push_lines(third, vec!["three".to_string()]));

    let tail = view.current().unwrap();
    assert_eq!(tail.stream(), "s3");
    assert_eq!(tail.lines().iter().collect::<Vec<_>>(), vec!["three"]);
}

#[test]
fn test_switching_back_keeps_earlier_lines() {
    let mut view = view(&["s1", "s2"], 100);
    let first = subscribed(&view.open().into_iter().collect::<Vec<_>>());
    view.push_lines(first, vec!["before".to_string()]);

    view.select(1);
    let again = subscribed(&view.select(0));
    assert!(view.push_lines(again, vec!["after".to_string()]));

    let lines: Vec<_> = view.current().unwrap().lines().iter().cloned().collect();
    assert_eq!(lines, vec!["before", "after"]);
}

#[test]
fn test_buffer_is_bounded() {
    let mut view = view(&["s1"], 3);
    let generation = subscribed(&view.open().into_iter().collect::<Vec<_>>());
    for batch in 0..4 {
        view.push_lines(generation, vec![format!("{batch}a"), format!("{batch}b")]);
    }

    let lines: Vec<_> = view.current().unwrap().lines().iter().cloned().collect();
    assert_eq!(lines, vec!["2b", "3a", "3b"]);
}

#[test]
fn test_pause_scroll_and_resume() {
    let mut view = view(&["s1"], 100);
    let generation = subscribed(&view.open().into_iter().collect::<Vec<_>>());
    view.push_lines(generation, (0..10).map(|i| i.to_string()).collect());

    let tail = view.current_mut().unwrap();
    assert_eq!(tail.first_visible(4), 6);
    assert_eq!(tail.toggle_follow(), Some(TailCommand::Unsubscribe));
    assert_eq!(tail.state(), TailState::Paused);

    tail.scroll_up();
    tail.scroll_up();
    assert_eq!(tail.first_visible(4), 4);

    // Lines that arrive while paused are dropped
    assert!(!tail.push_lines(generation, vec!["x".to_string()]));

    let resumed = tail.toggle_follow();
    assert!(matches!(resumed, Some(TailCommand::Subscribe { generation: g, backfill: false }) if g != generation));
    assert_eq!(tail.first_visible(4), 6);
}

#[test]
fn test_close_only_unsubscribes_when_streaming() {
    let mut idle = view(&["s1"], 10);
    assert_eq!(idle.close(), None);

    let mut streaming = view(&["s1"], 10);
    streaming.open();
    assert_eq!(streaming.close(), Some(TailCommand::Unsubscribe));
    assert_eq!(streaming.current().unwrap().state(), TailState::Closed);
}

#[test]
fn test_timestamps_highlighted_in_lambda_lines() {
    let line = "START RequestId: 42 2024-05-01T12:00:00.000Z INFO handled at 2024-05-01T12:00:01.250Z";
    let timestamps: Vec<&str> = split_timestamps(line)
        .into_iter()
        .filter(|(_, is_timestamp)| *is_timestamp)
        .map(|(text, _)| text)
        .collect();
    assert_eq!(timestamps, vec!["2024-05-01T12:00:00.000Z", "2024-05-01T12:00:01.250Z"]);

    let joined: String = split_timestamps(line).into_iter().map(|(t, _)| t).collect();
    assert_eq!(joined, line);
}

#[test]
fn test_history_requested_once_per_stream() {
    let backfills = |commands: Vec<TailCommand>| -> Vec<bool> {
        commands
            .into_iter()
            .filter_map(|c| match c {
                TailCommand::Subscribe { backfill, .. } => Some(backfill),
                TailCommand::Unsubscribe => None,
            })
            .collect()
    };

    let mut view = view(&["s1", "s2"], 100);
    let opened = view.open().into_iter().collect::<Vec<_>>();
    let first = subscribed(&opened);
    assert_eq!(backfills(opened), vec![true]);
    view.push_lines(first, vec!["from history".to_string()]);

    assert_eq!(backfills(view.select(1)), vec![true]);
    assert_eq!(backfills(view.select(0)), vec![false]);

    let tail = view.current_mut().unwrap();
    tail.set_follow(false);
    assert!(matches!(
        tail.set_follow(true),
        Some(TailCommand::Subscribe { backfill: false, .. })
    ));
    assert_eq!(tail.lines().len(), 1);
}
