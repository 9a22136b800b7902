use aws_voyager::ui::utils::{
    build_meter, format_bytes, format_task_counts, lower_title, shorten_arn, take_left,
    truncate_text,
};

#[test]
fn test_meter_always_has_requested_width() {
    for (used, reserved) in [(0, 0), (0, 512), (256, 512), (512, 512), (900, 512)] {
        for width in [1, 5, 10, 20] {
            let meter = build_meter(used, reserved, width);
            assert_eq!(meter.chars().count(), width, "{used}/{reserved} at {width}");
        }
    }
}

#[test]
fn test_meter_fill_grows_with_usage() {
    let filled = |used| build_meter(used, 100, 10).chars().filter(|c| *c == '█').count();
    let fills: Vec<usize> = [0, 10, 45, 50, 99, 100, 150].into_iter().map(filled).collect();
    assert!(fills.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fills.first(), Some(&0));
    assert_eq!(fills.last(), Some(&10));
}

#[test]
fn test_take_left_never_exceeds_limit() {
    let texts = ["", "orders", "ghcr.io/acme/orders:1.2.3-abcdef0", "ünïcödé-ïmägé:1"];
    for text in texts {
        for max in 1..12 {
            let cut = take_left(text, max);
            assert!(cut.chars().count() <= max, "{text:?} at {max}");
            if text.chars().count() <= max {
                assert_eq!(cut, text);
            } else {
                assert!(cut.ends_with('…'));
            }
        }
    }
}

#[test]
fn test_shorten_arn_is_idempotent() {
    let arns = [
        "arn:aws:ecs:eu-west-1:123:task/prod/0a1b2c",
        "arn:aws:ecs:eu-west-1:123:task-definition/orders:42",
        "orders:42",
        "/ecs/orders",
    ];
    for arn in arns {
        let short = shorten_arn(arn);
        assert_eq!(shorten_arn(short), short);
    }
    assert_eq!(shorten_arn(arns[0]), "0a1b2c");
}

#[test]
fn test_status_values_as_shown() {
    assert_eq!(lower_title("RUNNING"), "Running");
    assert_eq!(lower_title("COMPLETED"), "Completed");
    assert_eq!(lower_title("IN_PROGRESS"), "In_progress");
    assert_eq!(lower_title(""), "");
}

#[test]
fn test_lambda_column_values() {
    // Memory is configured in MB and shown through the byte formatter
    assert_eq!(format_bytes(128 * 1_000_000), "125 MB");
    assert_eq!(format_bytes(1024 * 1_000_000), "1000 MB");
    assert_eq!(format_task_counts(2, 0, 2), "2");
    assert_eq!(format_task_counts(1, 1, 3), "1 (1 pending) (3 desired)");
    assert_eq!(truncate_text("abc", 3), "abc");
}
