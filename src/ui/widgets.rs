//! Reusable dialog widgets.
//!
//! Spinners, message and confirmation dialogs, selection lists and the search
//! input. Dialogs clear the area below them and are drawn centered on screen.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use std::time::{SystemTime, UNIX_EPOCH};

use super::theme::Theme;
use super::utils::centered_rect;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Frame of the spinner animation at `millis`; frames advance every 80ms.
pub fn spinner_frame(millis: u128) -> &'static str {
    SPINNER_FRAMES[((millis / 80) % SPINNER_FRAMES.len() as u128) as usize]
}

/// Returns the current frame of the spinner animation
pub fn get_spinner_frame() -> &'static str {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    spinner_frame(now)
}

/// Renders an animated loading spinner with a message in a centered box
pub fn render_spinner(f: &mut Frame, message: &str, theme: &Theme) {
    let screen = f.area();
    let area = centered_rect(screen, 50.min(screen.width.saturating_sub(4)), 7);
    f.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}  ", get_spinner_frame()),
            Style::default().fg(theme.title).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(message, Style::default().fg(theme.warning))),
        Line::from(""),
    ];

    let widget = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .title("Loading")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.title))
            .style(Style::default().bg(theme.background)),
    );

    f.render_widget(widget, area);
}

/// Renders a message dialog with a single OK button
pub fn render_message_dialog(f: &mut Frame, message: &str, theme: &Theme) {
    let screen = f.area();
    let width = 70.min(screen.width.saturating_sub(4));
    let inner_width = usize::from(width.saturating_sub(4)).max(1);
    let text_lines = message.chars().count() / inner_width + 1;
    let height = (text_lines as u16).saturating_add(6).min(screen.height);
    let area = centered_rect(screen, width, height);

    f.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.background));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(1)
        .split(inner);

    let text = Paragraph::new(message)
        .style(Style::default().fg(theme.foreground))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(text, chunks[0]);

    let button = Paragraph::new("[ OK ]")
        .alignment(Alignment::Center)
        .style(
            Style::default()
                .fg(theme.highlight_fg)
                .bg(theme.highlight)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(button, chunks[1]);
}

/// Renders a confirmation dialog
///
/// # Arguments
/// * `f` - The ratatui Frame to render into
/// * `message` - Question to display
/// * `button` - Label of the confirming button, e.g. `Restart`
/// * `confirm_selected` - Whether the confirm button is selected
/// * `theme` - Theme for colors
pub fn render_confirmation_dialog(
    f: &mut Frame,
    message: &str,
    button: &str,
    confirm_selected: bool,
    theme: &Theme,
) {
    let screen = f.area();
    let area = centered_rect(screen, 60.min(screen.width.saturating_sub(4)), 8);

    f.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.warning))
        .style(Style::default().bg(theme.background));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(1)
        .split(inner);

    let msg_widget = Paragraph::new(message)
        .style(Style::default().fg(theme.foreground))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });
    f.render_widget(msg_widget, chunks[0]);

    let button_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let selected = Style::default()
        .fg(theme.highlight_fg)
        .bg(theme.highlight)
        .add_modifier(Modifier::BOLD);
    let (yes_style, no_style) = if confirm_selected {
        (selected, Style::default().fg(theme.foreground))
    } else {
        (Style::default().fg(theme.foreground), selected)
    };

    f.render_widget(
        Paragraph::new(format!("[ {button} ]"))
            .alignment(Alignment::Center)
            .style(yes_style),
        button_chunks[0],
    );
    f.render_widget(
        Paragraph::new("[ Cancel ]")
            .alignment(Alignment::Center)
            .style(no_style),
        button_chunks[1],
    );
}

/// Renders a centered selection list
///
/// # Arguments
/// * `f` - The ratatui Frame to render into
/// * `title` - List title
/// * `items` - Entries to choose from
/// * `selected_index` - Currently selected item index
/// * `theme` - Theme for colors
pub fn render_dropdown<T: AsRef<str>>(
    f: &mut Frame,
    title: &str,
    items: &[T],
    selected_index: usize,
    theme: &Theme,
) {
    let screen = f.area();
    let widest = items
        .iter()
        .map(|i| i.as_ref().chars().count())
        .chain(std::iter::once(title.chars().count()))
        .max()
        .unwrap_or_default();
    let width = (widest as u16)
        .saturating_add(8)
        .max(30)
        .min(screen.width.saturating_sub(4).max(1));
    let height = (items.len() as u16).saturating_add(2).min(screen.height.saturating_sub(4).max(3));
    let area = centered_rect(screen, width, height);

    f.render_widget(Clear, area);

    let list_items: Vec<ListItem> = items
        .iter()
        .map(|item| ListItem::new(format!("  {}", item.as_ref())))
        .collect();

    let widget = List::new(list_items)
        .block(
            Block::default()
                .title(format!(" {title} "))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.title))
                .style(Style::default().bg(theme.background).fg(theme.foreground)),
        )
        .highlight_style(
            Style::default()
                .fg(theme.highlight_fg)
                .bg(theme.highlight)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    state.select(Some(selected_index));
    f.render_stateful_widget(widget, area, &mut state);
}

/// Renders a text input field with a cursor
pub fn render_input_field(f: &mut Frame, area: Rect, label: &str, value: &str, theme: &Theme) {
    f.render_widget(Clear, area);

    let widget = Paragraph::new(format!("{value}_"))
        .style(Style::default().fg(theme.foreground))
        .alignment(Alignment::Left)
        .block(
            Block::default()
                .title(label)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.title))
                .style(Style::default().bg(theme.background)),
        );

    f.render_widget(widget, area);
}

/// Renders a warning in place of the UI when the terminal is too small
pub fn render_size_warning(f: &mut Frame, message: &str, theme: &Theme) {
    let widget = Paragraph::new(message)
        .style(Style::default().fg(theme.error).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(widget, f.area());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_spinner_frame_cycles() {
        assert_eq!(spinner_frame(0), "⠋");
        assert_eq!(spinner_frame(79), "⠋");
        assert_eq!(spinner_frame(80), "⠙");
        assert_eq!(spinner_frame(800), "⠋");
        assert!(!get_spinner_frame().is_empty());
    }

    #[test]
    fn test_confirmation_dialog_shows_button() {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal
            .draw(|f| {
                render_confirmation_dialog(f, "Restart it?", "Restart", true, &Theme::default())
            })
            .unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("Restart it?"));
        assert!(text.contains("[ Restart ]"));
        assert!(text.contains("[ Cancel ]"));
    }

    #[test]
    fn test_dropdown_lists_items() {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal
            .draw(|f| {
                render_dropdown(f, "web", &["Show logs", "Open shell", "Close"], 1, &Theme::default())
            })
            .unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("Show logs"));
        assert!(text.contains("Open shell"));
        assert!(text.contains(" web "));
    }

    #[test]
    fn test_dialogs_fit_tiny_screen() {
        let mut terminal = Terminal::new(TestBackend::new(10, 5)).unwrap();
        terminal
            .draw(|f| {
                let theme = Theme::default();
                render_message_dialog(f, "a fairly long message that wraps", &theme);
                render_dropdown(f, "t", &["a", "b", "c", "d", "e"], 4, &theme);
                render_spinner(f, "Loading", &theme);
            })
            .unwrap();
    }
}
