//! UI utility functions for formatting values and managing layout.
//!
//! This module provides the formatters used by the tables (sizes, ARNs, dates,
//! meters) plus helpers for truncating text, terminal size validation and
//! centering popups.

use chrono::{DateTime, Local, Utc};
use ratatui::layout::Rect;

/// Minimum terminal dimensions
pub const MIN_TERMINAL_WIDTH: u16 = 80;
pub const MIN_TERMINAL_HEIGHT: u16 = 24;

/// Width of image references in the services table.
pub const MAX_IMAGE_WIDTH: usize = 50;

const METER_FULL: char = '█';
const METER_EMPTY: char = '▒';

/// Validates that the terminal meets minimum size requirements
///
/// # Returns
/// Returns `Ok(())` if terminal is large enough, or an error message if too small
pub fn validate_terminal_size(width: u16, height: u16) -> Result<(), String> {
    if width < MIN_TERMINAL_WIDTH || height < MIN_TERMINAL_HEIGHT {
        Err(format!(
            "Terminal too small! Minimum size: {MIN_TERMINAL_WIDTH}x{MIN_TERMINAL_HEIGHT}, Current: {width}x{height}"
        ))
    } else {
        Ok(())
    }
}

/// Formats a byte count with integer division into B, KB or MB.
///
/// The thresholds are exclusive and MB uses 1 024 000 bytes, so `1_024_000`
/// is still shown as `1000 KB`.
///
/// # Examples
/// ```
/// use aws_voyager::ui::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(2048), "2 KB");
/// assert_eq!(format_bytes(5_000_000), "4 MB");
/// ```
pub fn format_bytes(bytes: i64) -> String {
    if bytes > 1_024_000 {
        format!("{} MB", bytes / 1_024_000)
    } else if bytes > 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{bytes} B")
    }
}

/// Removes everything up to and including the last `/`.
///
/// Turns ARNs and image references into their short name, e.g.
/// `arn:aws:ecs:eu-west-1:123:task-definition/orders:42` into `orders:42`.
/// A string without `/`, or whose only `/` is the first character, is
/// returned unchanged.
pub fn shorten_arn(s: &str) -> &str {
    match s.rfind('/') {
        Some(index) if index > 0 => &s[index + 1..],
        _ => s,
    }
}

/// Keeps the first `max` characters, ending with `…` when the text was cut.
pub fn take_left(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Draws a horizontal usage meter of `width` cells.
///
/// The filled share is `portion / total`, clamped to `[0, 1]` and rounded to
/// the nearest cell. A zero `total` draws an empty meter.
pub fn build_meter(portion: u32, total: u32, width: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        let ratio = (f64::from(portion) / f64::from(total)).clamp(0.0, 1.0);
        ((ratio * width as f64).round() as usize).min(width)
    };

    let mut meter = String::with_capacity(width * METER_FULL.len_utf8());
    meter.extend(std::iter::repeat(METER_FULL).take(filled));
    meter.extend(std::iter::repeat(METER_EMPTY).take(width - filled));
    meter
}

/// Lowercases a status and capitalizes the first letter of every word.
///
/// Letters, digits and underscores belong to a word, so `IN_PROGRESS` becomes
/// `In_progress` and `RUNNING TASK` becomes `Running Task`.
pub fn lower_title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;

    for c in s.chars() {
        let in_word = c.is_alphanumeric() || c == '_';
        if in_word && at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        at_word_start = !in_word;
    }
    out
}

/// Formats a timestamp in the local timezone as `dd-mm-yy HH:MM:SS`.
pub fn format_local_datetime(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%d-%m-%y %H:%M:%S").to_string()
}

/// Formats an optional timestamp, using an empty string when missing.
pub fn format_optional_datetime(t: Option<DateTime<Utc>>) -> String {
    t.map(format_local_datetime).unwrap_or_default()
}

/// Formats an RFC 3339 style timestamp string (as Lambda reports
/// `LastModified`) in local time. Unparseable input is returned as is.
pub fn format_timestamp_str(s: &str) -> String {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|t| format_local_datetime(t.with_timezone(&Utc)))
        .unwrap_or_else(|_| s.to_string())
}

/// Task counts of a service as `running[ (N pending)][ (N desired)]`.
///
/// Pending is shown only when tasks are pending, desired only when it differs
/// from running.
pub fn format_task_counts(running: i32, pending: i32, desired: i32) -> String {
    let mut out = running.to_string();
    if pending > 0 {
        out.push_str(&format!(" ({pending} pending)"));
    }
    if desired != running {
        out.push_str(&format!(" ({desired} desired)"));
    }
    out
}

/// Truncates text to fit within a maximum width, adding ellipsis if needed
///
/// # Examples
/// ```
/// use aws_voyager::ui::utils::truncate_text;
///
/// assert_eq!(truncate_text("Hello, World!", 10), "Hello, ...");
/// assert_eq!(truncate_text("Short", 10), "Short");
/// ```
pub fn truncate_text(text: &str, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        text.to_string()
    } else if max_width <= 3 {
        "...".to_string()
    } else {
        let truncated: String = text.chars().take(max_width - 3).collect();
        format!("{truncated}...")
    }
}

/// Creates a centered area within a parent area
///
/// # Arguments
/// * `parent` - The parent area
/// * `width` - Desired width (or parent width if larger)
/// * `height` - Desired height (or parent height if larger)
pub fn centered_rect(parent: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(parent.width);
    let height = height.min(parent.height);

    Rect {
        x: parent.x + (parent.width.saturating_sub(width)) / 2,
        y: parent.y + (parent.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_terminal_size_valid() {
        assert!(validate_terminal_size(80, 24).is_ok());
        assert!(validate_terminal_size(200, 60).is_ok());
    }

    #[test]
    fn test_validate_terminal_size_error_message() {
        let err = validate_terminal_size(60, 20).unwrap_err();
        assert!(err.contains("Terminal too small"));
        assert!(err.contains("80x24"));
        assert!(err.contains("60x20"));
    }

    #[test]
    fn test_format_bytes_thresholds() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1024), "1024 B");
        assert_eq!(format_bytes(1025), "1 KB");
        assert_eq!(format_bytes(1_024_000), "1000 KB");
        assert_eq!(format_bytes(1_024_001), "1 MB");
    }

    #[test]
    fn test_format_bytes_lambda_memory() {
        // Memory sizes are shown as MB * 1_000_000
        assert_eq!(format_bytes(128 * 1_000_000), "125 MB");
        assert_eq!(format_bytes(1024 * 1_000_000), "1000 MB");
    }

    #[test]
    fn test_shorten_arn() {
        assert_eq!(
            shorten_arn("arn:aws:ecs:eu-west-1:123456789012:task-definition/orders:42"),
            "orders:42"
        );
        assert_eq!(shorten_arn("ghcr.io/acme/orders:1.0"), "orders:1.0");
        assert_eq!(shorten_arn("no-slash"), "no-slash");
        assert_eq!(shorten_arn("/leading"), "/leading");
        assert_eq!(shorten_arn("trailing/"), "");
    }

    #[test]
    fn test_shorten_arn_idempotent() {
        for s in ["a/b/c", "ghcr.io/acme/orders:1.0", "plain", "/x"] {
            let once = shorten_arn(s);
            assert_eq!(shorten_arn(once), once);
        }
    }

    #[test]
    fn test_take_left() {
        assert_eq!(take_left("short", 10), "short");
        assert_eq!(take_left("exactly10!", 10), "exactly10!");
        assert_eq!(take_left("abcdefghijkl", 10), "abcdefghi…");
        assert_eq!(take_left("abcdefghijkl", 10).chars().count(), 10);
    }

    #[test]
    fn test_build_meter() {
        assert_eq!(build_meter(5, 10, 10), "█████▒▒▒▒▒");
        assert_eq!(build_meter(0, 10, 4), "▒▒▒▒");
        assert_eq!(build_meter(10, 10, 4), "████");
    }

    #[test]
    fn test_build_meter_edge_cases() {
        assert_eq!(build_meter(5, 0, 4), "▒▒▒▒");
        assert_eq!(build_meter(20, 10, 4), "████");
        assert_eq!(build_meter(1, 3, 10).chars().filter(|c| *c == '█').count(), 3);
        assert_eq!(build_meter(1, 3, 0), "");
    }

    #[test]
    fn test_lower_title() {
        assert_eq!(lower_title("IN_PROGRESS"), "In_progress");
        assert_eq!(lower_title("COMPLETED"), "Completed");
        assert_eq!(lower_title("running task"), "Running Task");
        assert_eq!(lower_title("x86_64"), "X86_64");
        assert_eq!(lower_title(""), "");
    }

    #[test]
    fn test_format_local_datetime_shape() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap();
        let formatted = format_local_datetime(t);
        // dd-mm-yy HH:MM:SS
        assert_eq!(formatted.len(), 17);
        assert_eq!(&formatted[2..3], "-");
        assert_eq!(&formatted[5..6], "-");
        assert_eq!(&formatted[8..9], " ");
        assert!(formatted.ends_with(":05"));
        assert_eq!(format_optional_datetime(None), "");
    }

    #[test]
    fn test_format_timestamp_str() {
        let formatted = format_timestamp_str("2024-03-09T12:30:05.000+0000");
        assert_eq!(formatted.len(), 17);
        assert!(formatted.ends_with(":05"));
        assert_eq!(format_timestamp_str("not a date"), "not a date");
    }

    #[test]
    fn test_format_task_counts() {
        assert_eq!(format_task_counts(2, 0, 2), "2");
        assert_eq!(format_task_counts(1, 1, 2), "1 (1 pending) (2 desired)");
        assert_eq!(format_task_counts(3, 0, 2), "3 (2 desired)");
        assert_eq!(format_task_counts(0, 0, 0), "0");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("Short", 10), "Short");
        assert_eq!(truncate_text("Hello, World!", 10), "Hello, ...");
        assert_eq!(truncate_text("Hello", 3), "...");
        assert_eq!(truncate_text("", 10), "");
    }

    #[test]
    fn test_centered_rect_normal() {
        let parent = Rect {
            x: 0,
            y: 0,
            width: 100,
            height: 50,
        };
        let result = centered_rect(parent, 60, 30);

        assert_eq!(result.width, 60);
        assert_eq!(result.height, 30);
        assert_eq!(result.x, 20);
        assert_eq!(result.y, 10);
    }

    #[test]
    fn test_centered_rect_too_large() {
        let parent = Rect {
            x: 0,
            y: 0,
            width: 50,
            height: 25,
        };
        let result = centered_rect(parent, 100, 50);

        assert_eq!(result.width, 50);
        assert_eq!(result.height, 25);
        assert_eq!(result.x, 0);
        assert_eq!(result.y, 0);
    }
}
