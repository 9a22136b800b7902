//! Terminal user interface rendering module.
//!
//! Draws the header with page tabs, the active page, the status bar and any
//! overlay (search, help, modal dialog, loading spinner) from [`App`] state.
//! Rendering reads the snapshot once per frame and never changes state.

use aws_sdk_ecs::types::Service;
use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
    Frame,
};

use super::theme::Theme;
use super::utils::{
    build_meter, centered_rect, format_bytes, format_local_datetime, format_optional_datetime,
    format_task_counts, format_timestamp_str, lower_title, shorten_arn, take_left, truncate_text,
    validate_terminal_size, MAX_IMAGE_WIDTH,
};
use super::widgets::{
    get_spinner_frame, render_confirmation_dialog, render_dropdown, render_input_field,
    render_message_dialog, render_size_warning, render_spinner,
};
use crate::app::{App, DetailFocus, DetailPage, Modal, Page};
use crate::aws::to_utc;
use crate::logtail::{split_timestamps, LogTail, LogView};
use crate::snapshot::{AccountSnapshot, ServiceData, ServiceDetail};

const METER_WIDTH: usize = 10;

/// Main rendering function that draws the entire UI.
pub fn draw(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let screen = f.area();
    if let Err(message) = validate_terminal_size(screen.width, screen.height) {
        render_size_warning(f, &message, theme);
        return;
    }

    let snapshot = app.snapshot();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Page
            Constraint::Length(1), // Status bar
        ])
        .split(screen);

    draw_header(f, chunks[0], app, &snapshot);

    match app.page {
        Page::Services => draw_services(f, chunks[1], app, &snapshot),
        Page::Functions => draw_functions(f, chunks[1], app, &snapshot),
        Page::Apis => draw_apis(f, chunks[1], app, &snapshot),
        Page::Logs => draw_logs(f, chunks[1], app),
        Page::ServiceDetail => draw_service_detail(f, chunks[1], app, &snapshot),
    }

    draw_status_bar(f, chunks[2], app);

    if app.search_mode {
        draw_search_input(f, app);
    }
    if app.show_help {
        draw_help(f, theme);
    }

    // Modal dialogs and the spinner go on top of everything else
    if let Some(modal) = &app.modal {
        draw_modal(f, modal, theme);
    } else if app.is_loading() {
        render_spinner(f, &app.status_message, theme);
    }
}

fn key_hint<'a>(key: &'a str, label: &'a str, theme: &Theme) -> [Span<'a>; 2] {
    [
        Span::styled(
            key,
            Style::default().fg(theme.key_hint).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {label}   "), Style::default().fg(theme.muted)),
    ]
}

fn draw_header(f: &mut Frame, area: Rect, app: &App, snapshot: &AccountSnapshot) {
    let theme = &app.theme;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let label = Style::default().fg(theme.muted);
    let value = Style::default()
        .fg(theme.title)
        .add_modifier(Modifier::BOLD);
    let refreshed = snapshot
        .refreshed_at
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string();

    let context = Line::from(vec![
        Span::styled("Account: ", label),
        Span::styled(snapshot.account_id.as_str(), value),
        Span::styled("  Cluster: ", label),
        Span::styled(snapshot.cluster_name.as_str(), value),
        Span::styled("  Region: ", label),
        Span::styled(app.region(), value),
        Span::styled(format!("  Refreshed at {refreshed}"), label),
    ]);
    f.render_widget(Paragraph::new(context), rows[0]);

    let mut hints = Vec::new();
    hints.extend(key_hint("u", "Update data", theme));
    hints.extend(key_hint("/", "Search", theme));
    hints.extend(key_hint("?", "Help", theme));
    hints.extend(key_hint("q", "Quit", theme));
    f.render_widget(Paragraph::new(Line::from(hints)), rows[1]);

    let titles: Vec<String> = Page::TABS
        .iter()
        .enumerate()
        .map(|(i, page)| format!("{} {}", i + 1, page.title()))
        .collect();
    let shown = match app.page {
        Page::ServiceDetail => app.return_page,
        page => page,
    };
    let selected = Page::TABS.iter().position(|p| *p == shown).unwrap_or_default();

    let tabs = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(theme.foreground))
        .highlight_style(
            Style::default()
                .fg(theme.highlight_fg)
                .bg(theme.highlight)
                .add_modifier(Modifier::BOLD),
        )
        .divider("|");
    f.render_widget(tabs, rows[2]);
}

fn header_row<'a>(cells: &[&'a str], theme: &Theme) -> Row<'a> {
    Row::new(cells.iter().copied()).style(
        Style::default()
            .fg(theme.table_header)
            .add_modifier(Modifier::BOLD),
    )
}

fn highlight_style(theme: &Theme) -> Style {
    Style::default()
        .fg(theme.highlight_fg)
        .bg(theme.highlight)
        .add_modifier(Modifier::BOLD)
}

fn table_block(title: String, focused: bool, theme: &Theme) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { theme.highlight } else { theme.border }))
}

fn list_title(name: &str, shown: usize, total: usize, query: &str) -> String {
    if query.is_empty() {
        format!(" {name} ({total}) ")
    } else {
        format!(" {name} ({shown}/{total}) filter: {query} ")
    }
}

/// Draws a list table with the row at `selected` highlighted and scrolled into view.
fn render_list_table(
    f: &mut Frame,
    area: Rect,
    table: Table,
    selected: Option<usize>,
    theme: &Theme,
) {
    let mut state = TableState::default();
    state.select(selected);
    f.render_stateful_widget(table.row_highlight_style(highlight_style(theme)), area, &mut state);
}

/// When the last deployment was created and the rollout state of the primary one.
fn deployment_summary(service: &Service) -> (Option<DateTime<Utc>>, String) {
    let deployed = service
        .deployments()
        .first()
        .and_then(|d| d.created_at())
        .and_then(to_utc);
    let rollout = service
        .deployments()
        .iter()
        .find(|d| d.status() == Some("PRIMARY"))
        .and_then(|d| d.rollout_state())
        .map(|state| lower_title(state.as_str()))
        .unwrap_or_default();
    (deployed, rollout)
}

fn service_tasks(service: &Service) -> String {
    format_task_counts(
        service.running_count(),
        service.pending_count(),
        service.desired_count(),
    )
}

fn draw_services(f: &mut Frame, area: Rect, app: &App, snapshot: &AccountSnapshot) {
    let theme = &app.theme;
    let services = app.visible_services(snapshot);

    let rows: Vec<Row> = services
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let (deployed, rollout) = deployment_summary(&s.service);
            Row::new(vec![
                (i + 1).to_string(),
                s.name().to_string(),
                s.task_definition().to_string(),
                s.containers
                    .first()
                    .map(|c| c.truncated_image.clone())
                    .unwrap_or_default(),
                format_optional_datetime(deployed),
                rollout,
                service_tasks(&s.service),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(20),
            Constraint::Percentage(15),
            Constraint::Percentage(25),
            Constraint::Length(17),
            Constraint::Length(12),
            Constraint::Min(10),
        ],
    )
    .header(header_row(
        &["#", "Name", "Task definition", "Image", "Last deployed", "Deployment", "Tasks"],
        theme,
    ))
    .block(table_block(
        list_title("Services", services.len(), snapshot.services.len(), &app.search_query),
        false,
        theme,
    ));

    let selected = (!services.is_empty()).then_some(app.services_selected);
    render_list_table(f, area, table, selected, theme);
}

fn draw_functions(f: &mut Frame, area: Rect, app: &App, snapshot: &AccountSnapshot) {
    let theme = &app.theme;
    let functions = app.visible_functions(snapshot);

    let rows: Vec<Row> = functions
        .iter()
        .enumerate()
        .map(|(i, function)| {
            let c = &function.configuration;
            let architectures: Vec<&str> = c.architectures().iter().map(|a| a.as_str()).collect();
            Row::new(vec![
                (i + 1).to_string(),
                function.name().to_string(),
                c.runtime().map(|r| r.as_str().to_string()).unwrap_or_default(),
                c.package_type().map(|p| p.as_str().to_string()).unwrap_or_default(),
                format_bytes(c.code_size()),
                c.memory_size()
                    .map(|m| format_bytes(i64::from(m) * 1_000_000))
                    .unwrap_or_default(),
                c.timeout().map(|t| format!("{t} s")).unwrap_or_default(),
                architectures.join(", "),
                c.last_modified().map(format_timestamp_str).unwrap_or_default(),
                function.last_deployed().unwrap_or_default().to_string(),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(22),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(17),
            Constraint::Min(10),
        ],
    )
    .header(header_row(
        &[
            "#",
            "Name",
            "Runtime",
            "Package",
            "Code size",
            "Memory",
            "Timeout",
            "Arch",
            "Last modified",
            "Last deployed",
        ],
        theme,
    ))
    .block(table_block(
        list_title("Functions", functions.len(), snapshot.functions.len(), &app.search_query),
        false,
        theme,
    ));

    let selected = (!functions.is_empty()).then_some(app.functions_selected);
    render_list_table(f, area, table, selected, theme);
}

fn draw_apis(f: &mut Frame, area: Rect, app: &App, snapshot: &AccountSnapshot) {
    let theme = &app.theme;
    let apis = app.visible_apis(snapshot);

    let rows: Vec<Row> = apis
        .iter()
        .enumerate()
        .map(|(i, api)| {
            Row::new(vec![
                (i + 1).to_string(),
                api.name.clone(),
                api.id.clone(),
                api.domain_name.clone(),
                api.api_type.to_string(),
                truncate_text(&api.description, 60),
                format_optional_datetime(api.created_at),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(20),
            Constraint::Length(12),
            Constraint::Percentage(25),
            Constraint::Length(8),
            Constraint::Min(10),
            Constraint::Length(17),
        ],
    )
    .header(header_row(
        &["#", "Name", "Id", "Domain name", "Protocol", "Description", "Created"],
        theme,
    ))
    .block(table_block(
        list_title("APIs", apis.len(), snapshot.apis.len(), &app.search_query),
        false,
        theme,
    ));

    let selected = (!apis.is_empty()).then_some(app.apis_selected);
    render_list_table(f, area, table, selected, theme);
}

fn draw_service_detail(f: &mut Frame, area: Rect, app: &App, snapshot: &AccountSnapshot) {
    let theme = &app.theme;
    let Some(page) = &app.detail else {
        return;
    };

    let Some(detail) = &page.detail else {
        let loading = Paragraph::new(format!("Loading {}...", page.service))
            .style(Style::default().fg(theme.warning))
            .block(table_block(format!(" {} ", page.service), false, theme));
        f.render_widget(loading, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9),
            Constraint::Percentage(50),
            Constraint::Min(5),
        ])
        .split(area);

    let service = snapshot.services.iter().find(|s| s.name() == page.service);
    draw_detail_summary(f, chunks[0], page, service, detail, theme);
    draw_detail_containers(f, chunks[1], page, detail, theme);
    draw_detail_deployables(f, chunks[2], page, detail, theme);
}

fn draw_detail_summary(
    f: &mut Frame,
    area: Rect,
    page: &DetailPage,
    service: Option<&ServiceData>,
    detail: &ServiceDetail,
    theme: &Theme,
) {
    let usage = detail.usage;
    let deployed = service.and_then(|s| deployment_summary(&s.service).0);
    let meter = |used: u32, reserved: u32, unit: &str| {
        format!("{} {used}/{reserved}{unit}", build_meter(used, reserved, METER_WIDTH))
    };

    let fields = [
        ("Name", page.service.clone()),
        (
            "Task definition",
            service.map(|s| s.task_definition().to_string()).unwrap_or_default(),
        ),
        (
            "Status",
            service
                .and_then(|s| s.service.status())
                .map(lower_title)
                .unwrap_or_default(),
        ),
        ("Deployed", format_optional_datetime(deployed)),
        ("Tasks", service.map(|s| service_tasks(&s.service)).unwrap_or_default()),
        ("CPU", meter(usage.cpu_used, usage.cpu_reserved, "")),
        ("Memory", meter(usage.memory_used, usage.memory_reserved, " MiB")),
    ];

    let rows: Vec<Row> = fields
        .into_iter()
        .map(|(name, value)| {
            Row::new(vec![
                Span::styled(name, Style::default().fg(theme.table_header)),
                Span::raw(value),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(16), Constraint::Min(10)]).block(table_block(
        " Details ".to_string(),
        page.focus == DetailFocus::Details,
        theme,
    ));
    f.render_widget(table, area);
}

fn draw_detail_containers(
    f: &mut Frame,
    area: Rect,
    page: &DetailPage,
    detail: &ServiceDetail,
    theme: &Theme,
) {
    let containers = detail.containers();
    let rows: Vec<Row> = containers
        .iter()
        .map(|(task, container)| {
            Row::new(vec![
                container.name().unwrap_or_default().to_string(),
                shorten_arn(task.task_arn().unwrap_or_default()).to_string(),
                shorten_arn(task.task_definition_arn().unwrap_or_default()).to_string(),
                take_left(shorten_arn(container.image().unwrap_or_default()), MAX_IMAGE_WIDTH),
                container.last_status().map(lower_title).unwrap_or_default(),
                container
                    .health_status()
                    .map(|h| lower_title(h.as_str()))
                    .unwrap_or_default(),
                container.memory().unwrap_or_default().to_string(),
                container.cpu().unwrap_or_default().to_string(),
            ])
        })
        .collect();

    let focused = page.focus == DetailFocus::Containers;
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(15),
            Constraint::Length(34),
            Constraint::Percentage(15),
            Constraint::Percentage(25),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(7),
            Constraint::Length(5),
        ],
    )
    .header(header_row(
        &["Name", "Task", "Task definition", "Image", "Status", "Health", "Memory", "CPU"],
        theme,
    ))
    .block(table_block(format!(" Containers ({}) ", containers.len()), focused, theme));

    let selected = (focused && !containers.is_empty()).then_some(page.containers_selected);
    render_list_table(f, area, table, selected, theme);
}

fn draw_detail_deployables(
    f: &mut Frame,
    area: Rect,
    page: &DetailPage,
    detail: &ServiceDetail,
    theme: &Theme,
) {
    let rows: Vec<Row> = detail
        .deployables
        .iter()
        .map(|d| {
            Row::new(vec![
                format_local_datetime(d.created),
                d.short_image().to_string(),
                truncate_text(d.commit_message.lines().next().unwrap_or_default(), 100),
            ])
        })
        .collect();

    let focused = page.focus == DetailFocus::Deployables;
    let table = Table::new(
        rows,
        [
            Constraint::Length(17),
            Constraint::Percentage(30),
            Constraint::Min(20),
        ],
    )
    .header(header_row(&["Created", "Image sha", "Commit message"], theme))
    .block(table_block(
        format!(" Deployables ({}) ", detail.deployables.len()),
        focused,
        theme,
    ));

    let selected = (focused && !detail.deployables.is_empty()).then_some(page.deployables_selected);
    render_list_table(f, area, table, selected, theme);
}

fn draw_logs(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let Some(view) = &app.log_view else {
        let hint = Paragraph::new(
            "No log view open.\n\nChoose \"Show logs\" on a service container or a function, \
             or \"Show access logs\" on an API.",
        )
        .style(Style::default().fg(theme.muted))
        .wrap(Wrap { trim: false })
        .block(table_block(" Logs ".to_string(), false, theme));
        f.render_widget(hint, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    draw_stream_selector(f, chunks[0], view, theme);
    if let Some(tail) = view.current() {
        draw_tail(f, chunks[1], tail, theme);
    }
}

fn draw_stream_selector(f: &mut Frame, area: Rect, view: &LogView, theme: &Theme) {
    let mut spans = vec![Span::styled(
        format!("{} ", view.log_group()),
        Style::default().fg(theme.title).add_modifier(Modifier::BOLD),
    )];

    for (i, stream) in view.streams().enumerate().take(9) {
        let style = if i == view.selected_index() {
            highlight_style(theme)
        } else {
            Style::default().fg(theme.muted)
        };
        spans.push(Span::styled(format!(" F{} {} ", i + 1, take_left(stream, 40)), style));
        spans.push(Span::raw(" "));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn log_line(line: &str, timestamp: Style) -> Line<'_> {
    Line::from(
        split_timestamps(line)
            .into_iter()
            .map(|(text, is_timestamp)| {
                if is_timestamp {
                    Span::styled(text, timestamp)
                } else {
                    Span::raw(text)
                }
            })
            .collect::<Vec<_>>(),
    )
}

fn draw_tail(f: &mut Frame, area: Rect, tail: &LogTail, theme: &Theme) {
    let height = usize::from(area.height.saturating_sub(2));
    let width = area.width.saturating_sub(2).max(1);
    let timestamp = Style::default().fg(theme.timestamp);
    let buffer = tail.lines();

    let first = tail.first_visible(height);
    let end = (first + height).min(buffer.len());

    // With wrap on a line can take several rows, so walk back from the last
    // shown line until the rows fill the view.
    let start = if tail.is_wrapped() {
        let mut start = end;
        let mut rows = 0;
        while start > 0 && rows < height {
            start -= 1;
            rows += log_line(&buffer[start], timestamp)
                .width()
                .div_ceil(usize::from(width))
                .max(1);
        }
        start
    } else {
        first
    };

    let lines: Vec<Line> = buffer
        .range(start..end)
        .map(|line| log_line(line, timestamp))
        .collect();

    let mut widget = Paragraph::new(lines).style(Style::default().fg(theme.foreground));
    if tail.is_wrapped() {
        widget = widget.wrap(Wrap { trim: false });
        // Word wrapping may need more rows than estimated; keep the last row in view.
        let overflow = widget.line_count(width).saturating_sub(height);
        widget = widget.scroll((u16::try_from(overflow).unwrap_or(u16::MAX), 0));
    }

    let border = if tail.is_following() {
        theme.success
    } else {
        theme.border
    };
    let widget = widget.block(
        Block::default()
            .title(tail.title())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border)),
    );
    f.render_widget(widget, area);
}

fn page_hints(page: Page) -> &'static str {
    match page {
        Page::Services => "↑↓ select  Enter open",
        Page::Functions | Page::Apis => "↑↓ select  Enter actions",
        Page::ServiceDetail => "Tab focus  Enter actions  r restart  Esc back",
        Page::Logs => "F1-F9 stream  f follow  w wrap  ↑↓ scroll  x close",
    }
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let mut spans = Vec::new();
    if app.is_loading() {
        spans.push(Span::styled(
            format!("{} ", get_spinner_frame()),
            Style::default().fg(theme.warning),
        ));
    }
    spans.push(Span::styled(
        app.status_message.as_str(),
        Style::default().fg(theme.foreground),
    ));
    spans.push(Span::styled(
        format!("   {}", page_hints(app.page)),
        Style::default().fg(theme.muted),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_search_input(f: &mut Frame, app: &App) {
    let screen = f.area();
    let width = 60.min(screen.width.saturating_sub(4));
    let area = Rect {
        x: screen.width.saturating_sub(width) / 2,
        y: screen.height.saturating_sub(6),
        width,
        height: 3,
    };
    render_input_field(
        f,
        area,
        "Search (Enter to apply, Esc to clear)",
        &app.search_query,
        &app.theme,
    );
}

fn draw_help(f: &mut Frame, theme: &Theme) {
    let section = |title: &'static str| {
        Line::from(Span::styled(
            title,
            Style::default().fg(theme.title).add_modifier(Modifier::BOLD),
        ))
    };
    let entry = |key: &'static str, text: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {key:<12}"), Style::default().fg(theme.table_header)),
            Span::raw(text),
        ])
    };

    let lines = vec![
        section("Navigation"),
        entry("1-4", "Services, functions, APIs, logs"),
        entry("↑/k ↓/j", "Move selection"),
        entry("Enter", "Open or show actions"),
        entry("Esc", "Back, close dialog or clear search"),
        entry("/", "Search by name"),
        Line::from(""),
        section("Service"),
        entry("Tab", "Next table"),
        entry("r", "Restart service"),
        Line::from(""),
        section("Logs"),
        entry("F1-F9", "Switch stream"),
        entry("f", "Follow on/off"),
        entry("w", "Wrap lines"),
        entry("x", "Close log view"),
        Line::from(""),
        section("General"),
        entry("u", "Update data"),
        entry("?", "Toggle help"),
        entry("q", "Quit"),
    ];

    let area = centered_rect(f.area(), 60, lines.len() as u16 + 2);
    f.render_widget(Clear, area);
    let help = Paragraph::new(lines).block(
        Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.title))
            .style(Style::default().bg(theme.background).fg(theme.foreground)),
    );
    f.render_widget(help, area);
}

fn draw_modal(f: &mut Frame, modal: &Modal, theme: &Theme) {
    match modal {
        Modal::Message { text } => render_message_dialog(f, text, theme),
        Modal::Confirm {
            text,
            button,
            confirm_selected,
            ..
        } => render_confirmation_dialog(f, text, button, *confirm_selected, theme),
        Modal::Actions {
            title,
            items,
            selected,
        } => {
            let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
            render_dropdown(f, title, &labels, *selected, theme);
        }
        Modal::Picker {
            title,
            items,
            selected,
            ..
        } => render_dropdown(f, title, items, *selected, theme),
    }
}
