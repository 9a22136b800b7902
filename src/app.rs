//! Application state management module.
//!
//! [`App`] holds everything the UI shows: the current snapshot, the active page,
//! selections, the open log view and modal dialogs. It performs no I/O. Key
//! presses are turned into [`AppCommand`]s that the event loop runs on
//! background workers, and worker results come back as [`AppEvent`]s.

use std::time::{Duration, Instant};

use aws_sdk_lambda::types::Architecture;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::aws::{log_group_arn, ApiGateway, StreamFilter};
use crate::config::Config;
use crate::logtail::{LogView, TailCommand};
use crate::snapshot::{AccountSnapshot, Function, ServiceData, ServiceDetail, SharedSnapshot};
use crate::ui::Theme;

/// Top level pages of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Services,
    Functions,
    Apis,
    Logs,
    ServiceDetail,
}

impl Page {
    /// Pages reachable from the tab bar, in key order `1`..`4`.
    pub const TABS: [Page; 4] = [Page::Services, Page::Functions, Page::Apis, Page::Logs];

    pub fn title(self) -> &'static str {
        match self {
            Page::Services => "Services",
            Page::Functions => "Functions",
            Page::Apis => "APIs",
            Page::Logs => "Logs",
            Page::ServiceDetail => "Service",
        }
    }

    fn from_config(view: &str) -> Self {
        match view {
            "functions" => Page::Functions,
            "apis" => Page::Apis,
            _ => Page::Services,
        }
    }
}

/// The focusable tables of the service detail page, in Tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailFocus {
    Details,
    Containers,
    Deployables,
}

impl DetailFocus {
    fn next(self) -> Self {
        match self {
            DetailFocus::Details => DetailFocus::Containers,
            DetailFocus::Containers => DetailFocus::Deployables,
            DetailFocus::Deployables => DetailFocus::Details,
        }
    }
}

/// State of the service detail page.
#[derive(Debug, Clone)]
pub struct DetailPage {
    pub service: String,
    /// `None` until the detail has been loaded.
    pub detail: Option<ServiceDetail>,
    pub focus: DetailFocus,
    pub containers_selected: usize,
    pub deployables_selected: usize,
}

impl DetailPage {
    fn new(service: String) -> Self {
        Self {
            service,
            detail: None,
            focus: DetailFocus::Details,
            containers_selected: 0,
            deployables_selected: 0,
        }
    }
}

/// Work the event loop carries out on behalf of the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
    Refresh,
    LoadServiceDetail {
        cluster: String,
        service: String,
    },
    RestartService {
        cluster: String,
        service: String,
    },
    DeployService {
        cluster: String,
        service: String,
        image: String,
    },
    FindLogStreams {
        log_group: String,
        group_arn: String,
        filter: StreamFilter,
    },
    /// Stop any running live tail and start one for `stream`, loading the
    /// recent history first when `backfill` is set.
    StartTail {
        log_group: String,
        group_arn: String,
        stream: String,
        generation: u64,
        backfill: bool,
    },
    StopTail,
    OpenShell {
        cluster: String,
        task_arn: String,
        container: String,
    },
    RestartFunction {
        function: String,
    },
    LoadFunctionVersions {
        function: String,
        architecture: Option<Architecture>,
    },
    DeployFunction {
        function: String,
        version: String,
        architecture: Option<Architecture>,
    },
}

/// Results posted back by workers.
#[derive(Debug)]
pub enum AppEvent {
    SnapshotLoaded(Result<AccountSnapshot, String>),
    ServiceDetailLoaded {
        service: String,
        result: Result<ServiceDetail, String>,
    },
    LogStreamsLoaded {
        log_group: String,
        group_arn: String,
        result: Result<Vec<String>, String>,
    },
    LogLines {
        generation: u64,
        lines: Vec<String>,
    },
    TailEnded {
        generation: u64,
        error: Option<String>,
    },
    FunctionVersionsLoaded {
        function: String,
        architecture: Option<Architecture>,
        result: Result<Vec<String>, String>,
    },
    /// A restart, deploy or shell finished; the text is shown to the user.
    ActionFinished(Result<String, String>),
}

/// What choosing an entry of an action list does.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionChoice {
    Run(AppCommand),
    Confirm { text: String, button: String, command: AppCommand },
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionItem {
    pub label: String,
    pub choice: ActionChoice,
}

impl ActionItem {
    fn new(label: &str, choice: ActionChoice) -> Self {
        Self {
            label: label.to_string(),
            choice,
        }
    }
}

/// Modal dialogs drawn on top of the current page.
#[derive(Debug, Clone, PartialEq)]
pub enum Modal {
    Message {
        text: String,
    },
    Confirm {
        text: String,
        button: String,
        /// true while the confirming button is highlighted
        confirm_selected: bool,
        command: AppCommand,
    },
    Actions {
        title: String,
        items: Vec<ActionItem>,
        selected: usize,
    },
    Picker {
        title: String,
        function: String,
        architecture: Option<Architecture>,
        items: Vec<String>,
        selected: usize,
    },
}

/// Main application state container.
pub struct App {
    pub config: Config,
    pub theme: Theme,
    region: String,
    snapshot: SharedSnapshot,
    running: bool,

    pub page: Page,
    /// Page to return to when the log view or the detail page is left
    pub return_page: Page,
    /// Page the log view was opened from
    logs_opened_from: Page,
    pub services_selected: usize,
    pub functions_selected: usize,
    pub apis_selected: usize,
    pub detail: Option<DetailPage>,
    pub log_view: Option<LogView>,
    pub modal: Option<Modal>,

    pub show_help: bool,
    pub search_mode: bool,
    pub search_query: String,

    pub status_message: String,
    pending_jobs: usize,
    pub last_refresh: Instant,

    github_enabled: bool,
    deploy_bucket: Option<String>,
}

fn next_index(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (index + 1) % len
    }
}

fn previous_index(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if index == 0 {
        len - 1
    } else {
        index - 1
    }
}

fn matches_query(name: &str, query: &str) -> bool {
    query.is_empty() || name.to_lowercase().contains(&query.to_lowercase())
}

impl App {
    /// Creates the application state around an initial snapshot.
    ///
    /// # Arguments
    /// * `config` - Application configuration loaded from config file
    /// * `region` - Region the AWS clients were built for, used in log group ARNs
    /// * `snapshot` - First account snapshot
    /// * `github_enabled` - Whether a GitHub client could be created
    pub fn new(config: Config, region: String, snapshot: AccountSnapshot, github_enabled: bool) -> Self {
        let page = Page::from_config(&config.behavior.default_view);
        let deploy_bucket = config.deploy.resolve_bucket();
        let theme = Theme::from_name(&config.ui.theme);

        Self {
            config,
            theme,
            region,
            snapshot: SharedSnapshot::new(snapshot),
            running: true,
            page,
            return_page: page,
            logs_opened_from: page,
            services_selected: 0,
            functions_selected: 0,
            apis_selected: 0,
            detail: None,
            log_view: None,
            modal: None,
            show_help: false,
            search_mode: false,
            search_query: String::new(),
            status_message: String::new(),
            pending_jobs: 0,
            last_refresh: Instant::now(),
            github_enabled,
            deploy_bucket,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn snapshot(&self) -> std::sync::Arc<AccountSnapshot> {
        self.snapshot.load()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_jobs > 0
    }

    pub fn deploy_bucket(&self) -> Option<&str> {
        self.deploy_bucket.as_deref()
    }

    #[cfg(test)]
    fn set_deploy_bucket(&mut self, bucket: Option<String>) {
        self.deploy_bucket = bucket;
    }

    fn begin_job(&mut self, status: impl Into<String>) {
        self.pending_jobs += 1;
        self.status_message = status.into();
    }

    fn finish_job(&mut self) {
        self.pending_jobs = self.pending_jobs.saturating_sub(1);
    }

    fn show_message(&mut self, text: impl Into<String>) {
        self.modal = Some(Modal::Message { text: text.into() });
    }

    /// Whether the timed auto refresh is due.
    pub fn should_refresh(&self) -> bool {
        self.config.behavior.auto_refresh
            && !self.is_loading()
            && self.last_refresh.elapsed() > Duration::from_secs(self.config.behavior.refresh_interval)
    }

    /// Starts a snapshot refresh.
    pub fn request_refresh(&mut self) -> AppCommand {
        self.last_refresh = Instant::now();
        self.begin_job("Refreshing...");
        AppCommand::Refresh
    }

    // Filtered views of the snapshot

    pub fn visible_services<'a>(&self, snapshot: &'a AccountSnapshot) -> Vec<&'a ServiceData> {
        snapshot
            .services
            .iter()
            .filter(|s| matches_query(s.name(), &self.search_query))
            .collect()
    }

    pub fn visible_functions<'a>(&self, snapshot: &'a AccountSnapshot) -> Vec<&'a Function> {
        snapshot
            .functions
            .iter()
            .filter(|f| matches_query(f.name(), &self.search_query))
            .collect()
    }

    pub fn visible_apis<'a>(&self, snapshot: &'a AccountSnapshot) -> Vec<&'a ApiGateway> {
        snapshot
            .apis
            .iter()
            .filter(|a| matches_query(&a.name, &self.search_query))
            .collect()
    }

    fn visible_len(&self, page: Page) -> usize {
        let snapshot = self.snapshot();
        match page {
            Page::Services => self.visible_services(&snapshot).len(),
            Page::Functions => self.visible_functions(&snapshot).len(),
            Page::Apis => self.visible_apis(&snapshot).len(),
            Page::Logs | Page::ServiceDetail => 0,
        }
    }

    fn selection_mut(&mut self, page: Page) -> Option<&mut usize> {
        match page {
            Page::Services => Some(&mut self.services_selected),
            Page::Functions => Some(&mut self.functions_selected),
            Page::Apis => Some(&mut self.apis_selected),
            Page::Logs | Page::ServiceDetail => None,
        }
    }

    // Navigation

    pub fn set_page(&mut self, page: Page) {
        if self.page != page {
            self.search_query.clear();
            self.search_mode = false;
        }
        self.page = page;
        if page != Page::Logs && page != Page::ServiceDetail {
            self.return_page = page;
        }
    }

    pub fn next(&mut self) {
        match self.page {
            Page::Logs => {
                if let Some(tail) = self.log_view.as_mut().and_then(LogView::current_mut) {
                    tail.scroll_down();
                }
            }
            Page::ServiceDetail => self.move_detail_selection(true),
            page => {
                let len = self.visible_len(page);
                if let Some(selected) = self.selection_mut(page) {
                    *selected = next_index(*selected, len);
                }
            }
        }
    }

    pub fn previous(&mut self) {
        match self.page {
            Page::Logs => {
                if let Some(tail) = self.log_view.as_mut().and_then(LogView::current_mut) {
                    tail.scroll_up();
                }
            }
            Page::ServiceDetail => self.move_detail_selection(false),
            page => {
                let len = self.visible_len(page);
                if let Some(selected) = self.selection_mut(page) {
                    *selected = previous_index(*selected, len);
                }
            }
        }
    }

    fn move_detail_selection(&mut self, forward: bool) {
        let Some(page) = self.detail.as_mut() else {
            return;
        };
        let Some(detail) = page.detail.as_ref() else {
            return;
        };
        let step = if forward { next_index } else { previous_index };

        match page.focus {
            DetailFocus::Details => {}
            DetailFocus::Containers => {
                page.containers_selected = step(page.containers_selected, detail.containers().len());
            }
            DetailFocus::Deployables => {
                page.deployables_selected = step(page.deployables_selected, detail.deployables.len());
            }
        }
    }

    /// Keeps selections inside the lists after the snapshot changed.
    fn clamp_selections(&mut self) {
        for page in [Page::Services, Page::Functions, Page::Apis] {
            let len = self.visible_len(page);
            if let Some(selected) = self.selection_mut(page) {
                *selected = (*selected).min(len.saturating_sub(1));
            }
        }
    }

    // Search

    pub fn enter_search_mode(&mut self) {
        self.search_mode = true;
        self.search_query.clear();
        self.reset_selection();
    }

    pub fn exit_search_mode(&mut self) {
        self.search_mode = false;
    }

    pub fn clear_search(&mut self) {
        self.search_mode = false;
        self.search_query.clear();
        self.reset_selection();
    }

    pub fn update_search(&mut self, c: char) {
        self.search_query.push(c);
        self.reset_selection();
    }

    pub fn delete_search_char(&mut self) {
        self.search_query.pop();
        self.reset_selection();
    }

    fn reset_selection(&mut self) {
        if let Some(selected) = self.selection_mut(self.page) {
            *selected = 0;
        }
    }

    // Key handling

    /// Maps a key press to state changes and the command the loop should run.
    pub fn handle_key(&mut self, key: KeyEvent) -> AppCommand {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.running = false;
            return AppCommand::Quit;
        }

        if self.modal.is_some() {
            return self.handle_modal_key(key);
        }

        if self.search_mode {
            match key.code {
                KeyCode::Char(c) => self.update_search(c),
                KeyCode::Backspace => self.delete_search_char(),
                KeyCode::Enter => self.exit_search_mode(),
                KeyCode::Esc => self.clear_search(),
                _ => {}
            }
            return AppCommand::None;
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Enter) {
                self.show_help = false;
            }
            return AppCommand::None;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.running = false;
                return AppCommand::Quit;
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                return AppCommand::None;
            }
            KeyCode::Char('u') => return self.request_refresh(),
            KeyCode::Char(c @ '1'..='4') => {
                let index = c as usize - '1' as usize;
                self.set_page(Page::TABS[index]);
                return AppCommand::None;
            }
            _ => {}
        }

        match self.page {
            Page::Services | Page::Functions | Page::Apis => self.handle_list_key(key),
            Page::ServiceDetail => self.handle_detail_key(key),
            Page::Logs => self.handle_log_key(key),
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> AppCommand {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Char('/') => self.enter_search_mode(),
            KeyCode::Esc => {
                if !self.search_query.is_empty() {
                    self.clear_search();
                }
            }
            KeyCode::Enter => return self.select(),
            _ => {}
        }
        AppCommand::None
    }

    fn select(&mut self) -> AppCommand {
        let snapshot = self.snapshot();
        match self.page {
            Page::Services => {
                let Some(service) = self.visible_services(&snapshot).get(self.services_selected).map(|s| s.name().to_string())
                else {
                    return AppCommand::None;
                };
                self.detail = Some(DetailPage::new(service.clone()));
                self.set_page(Page::ServiceDetail);
                self.begin_job(format!("Loading service {service}..."));
                AppCommand::LoadServiceDetail {
                    cluster: snapshot.cluster_name.clone(),
                    service,
                }
            }
            Page::Functions => {
                if let Some(function) = self.visible_functions(&snapshot).get(self.functions_selected) {
                    self.modal = Some(self.function_actions(function));
                }
                AppCommand::None
            }
            Page::Apis => {
                if let Some(api) = self.visible_apis(&snapshot).get(self.apis_selected) {
                    let command = self.find_streams_command(api.log_group(), StreamFilter::Any, &snapshot);
                    self.modal = Some(Modal::Actions {
                        title: api.name.clone(),
                        items: vec![
                            ActionItem::new("Show access logs", ActionChoice::Run(command)),
                            ActionItem::new("Close", ActionChoice::Close),
                        ],
                        selected: 0,
                    });
                }
                AppCommand::None
            }
            Page::Logs | Page::ServiceDetail => AppCommand::None,
        }
    }

    fn find_streams_command(&self, log_group: String, filter: StreamFilter, snapshot: &AccountSnapshot) -> AppCommand {
        AppCommand::FindLogStreams {
            group_arn: log_group_arn(&self.region, &snapshot.account_id, &log_group),
            log_group,
            filter,
        }
    }

    fn function_actions(&self, function: &Function) -> Modal {
        let snapshot = self.snapshot();
        let name = function.name().to_string();
        let architecture = function.configuration.architectures().first().cloned();

        Modal::Actions {
            title: name.clone(),
            items: vec![
                ActionItem::new(
                    "Show logs",
                    ActionChoice::Run(self.find_streams_command(function.log_group(), StreamFilter::Any, &snapshot)),
                ),
                ActionItem::new(
                    "Restart function",
                    ActionChoice::Confirm {
                        text: format!("Are you sure you want to restart the {name} lambda function?"),
                        button: "Restart".to_string(),
                        command: AppCommand::RestartFunction { function: name.clone() },
                    },
                ),
                ActionItem::new(
                    "Deploy version",
                    ActionChoice::Run(AppCommand::LoadFunctionVersions {
                        function: name,
                        architecture,
                    }),
                ),
                ActionItem::new("Close", ActionChoice::Close),
            ],
            selected: 0,
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) -> AppCommand {
        match key.code {
            KeyCode::Esc | KeyCode::Char('h') => {
                self.detail = None;
                self.set_page(self.return_page);
            }
            KeyCode::Tab => {
                if let Some(page) = self.detail.as_mut() {
                    page.focus = page.focus.next();
                }
            }
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Char('r') => {
                if let Some(page) = &self.detail {
                    self.modal = Some(Modal::Confirm {
                        text: "Do you really want to restart the service?".to_string(),
                        button: "Restart".to_string(),
                        confirm_selected: true,
                        command: AppCommand::RestartService {
                            cluster: self.snapshot().cluster_name.clone(),
                            service: page.service.clone(),
                        },
                    });
                }
            }
            KeyCode::Enter => self.select_in_detail(),
            _ => {}
        }
        AppCommand::None
    }

    fn select_in_detail(&mut self) {
        let snapshot = self.snapshot();
        let Some(page) = &self.detail else {
            return;
        };
        let Some(detail) = &page.detail else {
            return;
        };

        match page.focus {
            DetailFocus::Details => {}
            DetailFocus::Containers => {
                let containers = detail.containers();
                let Some((task, container)) = containers.get(page.containers_selected) else {
                    return;
                };
                let task_arn = task.task_arn().unwrap_or_default().to_string();
                let name = container.name().unwrap_or_default().to_string();

                let service = snapshot.services.iter().find(|s| s.name() == page.service);
                let definition = service.and_then(|s| s.containers.iter().find(|c| c.name == name));
                let (log_group, prefix) = match definition {
                    Some(c) => (c.log_group.clone(), c.log_stream_prefix.clone()),
                    None => (format!("/ecs/{}", page.service), name.clone()),
                };

                let logs = self.find_streams_command(
                    log_group,
                    StreamFilter::Container {
                        task_arn: task_arn.clone(),
                        prefix,
                    },
                    &snapshot,
                );
                let shell = AppCommand::OpenShell {
                    cluster: snapshot.cluster_name.clone(),
                    task_arn,
                    container: name.clone(),
                };

                self.modal = Some(Modal::Actions {
                    title: name,
                    items: vec![
                        ActionItem::new("Show logs", ActionChoice::Run(logs)),
                        ActionItem::new("Open shell", ActionChoice::Run(shell)),
                        ActionItem::new("Close", ActionChoice::Close),
                    ],
                    selected: 0,
                });
            }
            DetailFocus::Deployables => {
                if !self.github_enabled {
                    self.show_message("GitHub integration is not configured");
                    return;
                }
                let Some(deployable) = detail.deployables.get(page.deployables_selected) else {
                    return;
                };
                self.modal = Some(Modal::Confirm {
                    text: format!("Do you want to deploy version {}?", deployable.short_image()),
                    button: "Deploy".to_string(),
                    confirm_selected: true,
                    command: AppCommand::DeployService {
                        cluster: snapshot.cluster_name.clone(),
                        service: page.service.clone(),
                        image: deployable.image.clone(),
                    },
                });
            }
        }
    }

    fn handle_log_key(&mut self, key: KeyEvent) -> AppCommand {
        let Some(view) = self.log_view.as_mut() else {
            return AppCommand::None;
        };

        let command = match key.code {
            KeyCode::F(n @ 1..=9) => {
                let commands = view.select(usize::from(n - 1));
                commands.last().copied()
            }
            KeyCode::Char('f') => view.current_mut().and_then(|t| t.toggle_follow()),
            KeyCode::Char('w') => {
                if let Some(tail) = view.current_mut() {
                    tail.toggle_wrap();
                }
                None
            }
            KeyCode::Char('x') | KeyCode::Esc => {
                let command = view.close();
                self.log_view = None;
                let back = match self.logs_opened_from {
                    Page::ServiceDetail if self.detail.is_none() => self.return_page,
                    page => page,
                };
                self.set_page(back);
                return match command {
                    Some(_) => AppCommand::StopTail,
                    None => AppCommand::None,
                };
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(tail) = view.current_mut() {
                    tail.scroll_up();
                }
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(tail) = view.current_mut() {
                    tail.scroll_down();
                }
                None
            }
            _ => None,
        };

        self.tail_command(command)
    }

    /// Turns a log tail side effect into a command for the loop.
    fn tail_command(&self, command: Option<TailCommand>) -> AppCommand {
        match (command, &self.log_view) {
            (Some(TailCommand::Subscribe { generation, backfill }), Some(view)) => match view.current() {
                Some(tail) => AppCommand::StartTail {
                    log_group: view.log_group().to_string(),
                    group_arn: tail.group_arn().to_string(),
                    stream: tail.stream().to_string(),
                    generation,
                    backfill,
                },
                None => AppCommand::None,
            },
            (Some(TailCommand::Unsubscribe), _) => AppCommand::StopTail,
            _ => AppCommand::None,
        }
    }

    fn handle_modal_key(&mut self, key: KeyEvent) -> AppCommand {
        let Some(modal) = self.modal.as_mut() else {
            return AppCommand::None;
        };

        match modal {
            Modal::Message { .. } => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    self.modal = None;
                }
                AppCommand::None
            }
            Modal::Confirm {
                confirm_selected,
                command,
                ..
            } => match key.code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                    *confirm_selected = !*confirm_selected;
                    AppCommand::None
                }
                KeyCode::Enter => {
                    let command = if *confirm_selected {
                        command.clone()
                    } else {
                        AppCommand::None
                    };
                    self.modal = None;
                    self.dispatch(command)
                }
                KeyCode::Esc => {
                    self.modal = None;
                    AppCommand::None
                }
                _ => AppCommand::None,
            },
            Modal::Actions { items, selected, .. } => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    *selected = previous_index(*selected, items.len());
                    AppCommand::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    *selected = next_index(*selected, items.len());
                    AppCommand::None
                }
                KeyCode::Enter => {
                    let choice = items.get(*selected).map(|i| i.choice.clone());
                    self.modal = None;
                    match choice {
                        Some(ActionChoice::Run(command)) => self.dispatch(command),
                        Some(ActionChoice::Confirm { text, button, command }) => {
                            self.modal = Some(Modal::Confirm {
                                text,
                                button,
                                confirm_selected: true,
                                command,
                            });
                            AppCommand::None
                        }
                        Some(ActionChoice::Close) | None => AppCommand::None,
                    }
                }
                KeyCode::Esc => {
                    self.modal = None;
                    AppCommand::None
                }
                _ => AppCommand::None,
            },
            Modal::Picker {
                function,
                architecture,
                items,
                selected,
                ..
            } => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    *selected = previous_index(*selected, items.len());
                    AppCommand::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    *selected = next_index(*selected, items.len());
                    AppCommand::None
                }
                KeyCode::Enter => {
                    let command = match items.get(*selected) {
                        Some(version) => AppCommand::DeployFunction {
                            function: function.clone(),
                            version: version.clone(),
                            architecture: architecture.clone(),
                        },
                        None => AppCommand::None,
                    };
                    self.modal = None;
                    self.dispatch(command)
                }
                KeyCode::Esc => {
                    self.modal = None;
                    AppCommand::None
                }
                _ => AppCommand::None,
            },
        }
    }

    /// Records a worker command as pending, or answers it locally when it
    /// cannot run.
    fn dispatch(&mut self, command: AppCommand) -> AppCommand {
        match &command {
            AppCommand::RestartService { service, .. } => {
                self.begin_job(format!("Restarting service {service}..."));
            }
            AppCommand::DeployService { service, .. } => {
                self.begin_job(format!("Deploying service {service}..."));
            }
            AppCommand::RestartFunction { function } => {
                self.begin_job(format!("Restarting function {function}..."));
            }
            AppCommand::LoadFunctionVersions { function, .. } => {
                if self.deploy_bucket.is_none() {
                    self.show_message(format!(
                        "No deployment bucket configured, set {} or deploy.bucket",
                        crate::config::DEPLOY_BUCKET_ENV
                    ));
                    return AppCommand::None;
                }
                self.begin_job(format!("Loading versions of {function}..."));
            }
            AppCommand::DeployFunction { function, version, .. } => {
                self.begin_job(format!("Deploying {version} to {function}..."));
            }
            AppCommand::FindLogStreams { log_group, .. } => {
                self.begin_job(format!("Looking for log streams in {log_group}..."));
            }
            AppCommand::OpenShell { container, .. } => {
                self.begin_job(format!("Opening shell in {container}..."));
            }
            _ => {}
        }
        command
    }

    // Worker results

    /// Applies a worker result. Some results lead to follow-up work, returned
    /// as a command.
    pub fn handle_event(&mut self, event: AppEvent) -> AppCommand {
        match event {
            AppEvent::SnapshotLoaded(result) => {
                self.finish_job();
                match result {
                    Ok(snapshot) => {
                        self.snapshot.replace(snapshot);
                        self.clamp_selections();
                        self.status_message = "Data refreshed".to_string();
                    }
                    Err(e) => {
                        tracing::error!("Refresh failed: {}", e);
                        self.status_message = "Refresh failed".to_string();
                        self.show_message(format!("Failed to refresh data: {e}"));
                    }
                }
                AppCommand::None
            }
            AppEvent::ServiceDetailLoaded { service, result } => {
                self.finish_job();
                match result {
                    Ok(detail) => {
                        if let Some(page) = self.detail.as_mut().filter(|p| p.service == service) {
                            page.detail = Some(detail);
                            page.containers_selected = 0;
                            page.deployables_selected = 0;
                        }
                        self.status_message = format!("Loaded service {service}");
                    }
                    Err(e) => self.show_message(format!("Failed to load service {service}: {e}")),
                }
                AppCommand::None
            }
            AppEvent::LogStreamsLoaded {
                log_group,
                group_arn,
                result,
            } => {
                self.finish_job();
                match result {
                    Ok(streams) if streams.is_empty() => {
                        self.show_message(format!("Could not find any log streams for log group {log_group}"));
                        AppCommand::None
                    }
                    Ok(streams) => {
                        let mut view = LogView::new(log_group, &group_arn, streams, self.config.logs.max_lines);
                        let command = view.open();
                        self.log_view = Some(view);
                        if self.page != Page::Logs {
                            self.logs_opened_from = self.page;
                        }
                        self.set_page(Page::Logs);
                        self.tail_command(command)
                    }
                    Err(e) => {
                        self.show_message(format!("Failed to find log streams for {log_group}: {e}"));
                        AppCommand::None
                    }
                }
            }
            AppEvent::LogLines { generation, lines } => {
                if let Some(view) = self.log_view.as_mut() {
                    view.push_lines(generation, lines);
                }
                AppCommand::None
            }
            AppEvent::TailEnded { generation, error } => {
                let Some(tail) = self
                    .log_view
                    .as_mut()
                    .and_then(LogView::current_mut)
                    .filter(|t| t.generation() == generation)
                else {
                    return AppCommand::None;
                };
                // The stream is already gone, pausing only updates the state.
                let _ = tail.set_follow(false);
                if let Some(e) = error {
                    self.show_message(format!("Live tail stopped: {e}"));
                }
                AppCommand::None
            }
            AppEvent::FunctionVersionsLoaded {
                function,
                architecture,
                result,
            } => {
                self.finish_job();
                match result {
                    Ok(versions) if versions.is_empty() => {
                        let bucket = self.deploy_bucket.clone().unwrap_or_default();
                        self.show_message(format!("No versions of {function} found in {bucket}"));
                    }
                    Ok(versions) => {
                        self.modal = Some(Modal::Picker {
                            title: format!("Deploy {function}"),
                            function,
                            architecture,
                            items: versions,
                            selected: 0,
                        });
                    }
                    Err(e) => self.show_message(format!("Failed to list versions of {function}: {e}")),
                }
                AppCommand::None
            }
            AppEvent::ActionFinished(result) => {
                self.finish_job();
                match result {
                    Ok(text) => {
                        self.status_message = text.clone();
                        self.show_message(text);
                    }
                    Err(e) => self.show_message(e),
                }
                AppCommand::None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aws::ApiType;
    use crate::github::Deployable;
    use aws_sdk_ecs::types::{Container as EcsContainer, Service, Task};
    use aws_sdk_lambda::types::FunctionConfiguration;
    use chrono::Utc;
    use std::collections::HashMap;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn service(name: &str) -> ServiceData {
        ServiceData {
            service: Service::builder().service_name(name).build(),
            containers: vec![crate::snapshot::Container {
                name: "web".to_string(),
                truncated_image: "orders:1".to_string(),
                log_stream_prefix: "web".to_string(),
                log_group: format!("/ecs/{name}"),
            }],
        }
    }

    fn function(name: &str) -> Function {
        Function {
            configuration: FunctionConfiguration::builder()
                .function_name(name)
                .architectures(Architecture::Arm64)
                .build(),
            tags: HashMap::new(),
        }
    }

    fn test_snapshot() -> AccountSnapshot {
        let mut snapshot = AccountSnapshot::empty("123456789012", "prod");
        snapshot.services = vec![service("billing"), service("orders"), service("shipping")];
        snapshot.functions = vec![function("order-handler"), function("report-job")];
        snapshot.apis = vec![ApiGateway {
            name: "public-api".to_string(),
            id: "abc".to_string(),
            domain_name: "api.example.com".to_string(),
            api_type: ApiType::Http,
            created_at: None,
            description: String::new(),
        }];
        snapshot
    }

    fn test_app() -> App {
        App::new(Config::default(), "eu-west-1".to_string(), test_snapshot(), true)
    }

    fn detail_with_task() -> ServiceDetail {
        ServiceDetail {
            tasks: vec![Task::builder()
                .task_arn("arn:aws:ecs:eu-west-1:123456789012:task/prod/0f1e2d3c")
                .containers(EcsContainer::builder().name("web").build())
                .build()],
            usage: Default::default(),
            deployables: vec![Deployable {
                created: Utc::now(),
                sha: "bbbbbbb".to_string(),
                image: "ghcr.io/acme/orders:main-bbbbbbb".to_string(),
                commit_message: "Add export".to_string(),
            }],
        }
    }

    fn open_detail(app: &mut App) {
        app.services_selected = 1;
        let command = app.handle_key(key(KeyCode::Enter));
        assert_eq!(
            command,
            AppCommand::LoadServiceDetail {
                cluster: "prod".to_string(),
                service: "orders".to_string()
            }
        );
        app.handle_event(AppEvent::ServiceDetailLoaded {
            service: "orders".to_string(),
            result: Ok(detail_with_task()),
        });
    }

    #[test]
    fn test_default_page_from_config() {
        let mut config = Config::default();
        config.behavior.default_view = "functions".to_string();
        let app = App::new(config, "eu-west-1".to_string(), test_snapshot(), false);
        assert_eq!(app.page, Page::Functions);
    }

    #[test]
    fn test_next_wraps_around() {
        let mut app = test_app();
        app.services_selected = 2;
        app.next();
        assert_eq!(app.services_selected, 0);
    }

    #[test]
    fn test_previous_wraps_around() {
        let mut app = test_app();
        app.previous();
        assert_eq!(app.services_selected, 2);
        app.previous();
        assert_eq!(app.services_selected, 1);
    }

    #[test]
    fn test_number_keys_switch_pages() {
        let mut app = test_app();
        app.handle_key(key(KeyCode::Char('2')));
        assert_eq!(app.page, Page::Functions);
        app.handle_key(key(KeyCode::Char('3')));
        assert_eq!(app.page, Page::Apis);
        app.handle_key(key(KeyCode::Char('4')));
        assert_eq!(app.page, Page::Logs);
        app.handle_key(key(KeyCode::Char('1')));
        assert_eq!(app.page, Page::Services);
    }

    #[test]
    fn test_quit_and_refresh_keys() {
        let mut app = test_app();
        assert_eq!(app.handle_key(key(KeyCode::Char('u'))), AppCommand::Refresh);
        assert!(app.is_loading());

        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppCommand::Quit);
        assert!(!app.running());
    }

    #[test]
    fn test_search_filters_case_insensitive() {
        let mut app = test_app();
        app.handle_key(key(KeyCode::Char('/')));
        for c in "ORD".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Enter));

        let snapshot = app.snapshot();
        let visible = app.visible_services(&snapshot);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name(), "orders");
        assert!(!app.search_mode);

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.visible_services(&snapshot).len(), 3);
    }

    #[test]
    fn test_enter_opens_service_detail() {
        let mut app = test_app();
        open_detail(&mut app);

        assert_eq!(app.page, Page::ServiceDetail);
        let page = app.detail.as_ref().unwrap();
        assert_eq!(page.service, "orders");
        assert!(page.detail.is_some());
        assert!(!app.is_loading());

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.page, Page::Services);
        assert!(app.detail.is_none());
        assert_eq!(app.services_selected, 1);
    }

    #[test]
    fn test_detail_tab_cycles_focus() {
        let mut app = test_app();
        open_detail(&mut app);

        let focus = |app: &App| app.detail.as_ref().unwrap().focus;
        assert_eq!(focus(&app), DetailFocus::Details);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(focus(&app), DetailFocus::Containers);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(focus(&app), DetailFocus::Deployables);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(focus(&app), DetailFocus::Details);
    }

    #[test]
    fn test_restart_service_needs_confirmation() {
        let mut app = test_app();
        open_detail(&mut app);

        app.handle_key(key(KeyCode::Char('r')));
        match &app.modal {
            Some(Modal::Confirm { text, .. }) => {
                assert_eq!(text, "Do you really want to restart the service?");
            }
            other => panic!("expected confirm modal, got {other:?}"),
        }

        let command = app.handle_key(key(KeyCode::Enter));
        assert_eq!(
            command,
            AppCommand::RestartService {
                cluster: "prod".to_string(),
                service: "orders".to_string()
            }
        );
        assert!(app.modal.is_none());
    }

    #[test]
    fn test_confirm_cancel_with_arrows() {
        let mut app = test_app();
        open_detail(&mut app);

        app.handle_key(key(KeyCode::Char('r')));
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppCommand::None);
        assert!(app.modal.is_none());
    }

    #[test]
    fn test_container_actions() {
        let mut app = test_app();
        open_detail(&mut app);
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Enter));

        let Some(Modal::Actions { items, .. }) = &app.modal else {
            panic!("expected actions modal");
        };
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Show logs", "Open shell", "Close"]);

        let command = app.handle_key(key(KeyCode::Enter));
        assert_eq!(
            command,
            AppCommand::FindLogStreams {
                log_group: "/ecs/orders".to_string(),
                group_arn: "arn:aws:logs:eu-west-1:123456789012:log-group:/ecs/orders".to_string(),
                filter: StreamFilter::Container {
                    task_arn: "arn:aws:ecs:eu-west-1:123456789012:task/prod/0f1e2d3c".to_string(),
                    prefix: "web".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_open_shell_action() {
        let mut app = test_app();
        open_detail(&mut app);
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Down));

        let command = app.handle_key(key(KeyCode::Enter));
        assert_eq!(
            command,
            AppCommand::OpenShell {
                cluster: "prod".to_string(),
                task_arn: "arn:aws:ecs:eu-west-1:123456789012:task/prod/0f1e2d3c".to_string(),
                container: "web".to_string(),
            }
        );
    }

    #[test]
    fn test_deploy_deployable() {
        let mut app = test_app();
        open_detail(&mut app);
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Enter));

        match &app.modal {
            Some(Modal::Confirm { text, .. }) => {
                assert_eq!(text, "Do you want to deploy version orders:main-bbbbbbb?");
            }
            other => panic!("expected confirm modal, got {other:?}"),
        }
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppCommand::DeployService {
                cluster: "prod".to_string(),
                service: "orders".to_string(),
                image: "ghcr.io/acme/orders:main-bbbbbbb".to_string(),
            }
        );
    }

    #[test]
    fn test_function_actions_and_deploy_picker() {
        let mut app = test_app();
        app.set_deploy_bucket(Some("artifacts".to_string()));
        app.set_page(Page::Functions);
        app.handle_key(key(KeyCode::Enter));

        let Some(Modal::Actions { items, .. }) = &app.modal else {
            panic!("expected actions modal");
        };
        assert_eq!(items.len(), 4);

        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        let command = app.handle_key(key(KeyCode::Enter));
        assert_eq!(
            command,
            AppCommand::LoadFunctionVersions {
                function: "order-handler".to_string(),
                architecture: Some(Architecture::Arm64),
            }
        );

        app.handle_event(AppEvent::FunctionVersionsLoaded {
            function: "order-handler".to_string(),
            architecture: Some(Architecture::Arm64),
            result: Ok(vec!["1.0.zip".to_string(), "1.1.zip".to_string()]),
        });
        app.handle_key(key(KeyCode::Down));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppCommand::DeployFunction {
                function: "order-handler".to_string(),
                version: "1.1.zip".to_string(),
                architecture: Some(Architecture::Arm64),
            }
        );
    }

    #[test]
    fn test_deploy_without_bucket_shows_message() {
        let mut app = test_app();
        app.set_deploy_bucket(None);
        app.set_page(Page::Functions);
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));

        assert_eq!(app.handle_key(key(KeyCode::Enter)), AppCommand::None);
        assert!(matches!(app.modal, Some(Modal::Message { .. })));
    }

    #[test]
    fn test_restart_function_confirms() {
        let mut app = test_app();
        app.set_page(Page::Functions);
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Enter));

        assert!(matches!(app.modal, Some(Modal::Confirm { .. })));
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppCommand::RestartFunction {
                function: "order-handler".to_string()
            }
        );
    }

    #[test]
    fn test_no_log_streams_message() {
        let mut app = test_app();
        app.handle_event(AppEvent::LogStreamsLoaded {
            log_group: "/aws/lambda/order-handler".to_string(),
            group_arn: "arn".to_string(),
            result: Ok(Vec::new()),
        });

        assert_eq!(
            app.modal,
            Some(Modal::Message {
                text: "Could not find any log streams for log group /aws/lambda/order-handler".to_string()
            })
        );
        app.handle_key(key(KeyCode::Enter));
        assert!(app.modal.is_none());
    }

    #[test]
    fn test_log_streams_open_view_and_route_lines() {
        let mut app = test_app();
        let command = app.handle_event(AppEvent::LogStreamsLoaded {
            log_group: "/ecs/orders".to_string(),
            group_arn: "arn:group".to_string(),
            result: Ok(vec!["s1".to_string(), "s2".to_string()]),
        });

        let AppCommand::StartTail {
            stream, generation, ..
        } = command
        else {
            panic!("expected start tail");
        };
        assert_eq!(stream, "s1");
        assert_eq!(app.page, Page::Logs);

        app.handle_event(AppEvent::LogLines {
            generation,
            lines: vec!["hello".to_string()],
        });
        let tail = app.log_view.as_ref().and_then(LogView::current).unwrap();
        assert_eq!(tail.lines().len(), 1);

        // F2 switches to the second stream
        let command = app.handle_key(key(KeyCode::F(2)));
        assert!(matches!(command, AppCommand::StartTail { ref stream, .. } if stream == "s2"));

        // Pausing stops the tail, closing leaves the page
        assert_eq!(app.handle_key(key(KeyCode::Char('f'))), AppCommand::StopTail);
        assert_eq!(app.handle_key(key(KeyCode::Char('x'))), AppCommand::None);
        assert!(app.log_view.is_none());
        assert_eq!(app.page, Page::Services);
    }

    fn start_tail_backfill(command: &AppCommand) -> bool {
        match command {
            AppCommand::StartTail { backfill, .. } => *backfill,
            other => panic!("expected start tail, got {other:?}"),
        }
    }

    #[test]
    fn test_resume_and_reopen_do_not_backfill() {
        let mut app = test_app();
        let command = app.handle_event(AppEvent::LogStreamsLoaded {
            log_group: "/ecs/orders".to_string(),
            group_arn: "arn:group".to_string(),
            result: Ok(vec!["s1".to_string(), "s2".to_string()]),
        });
        assert!(start_tail_backfill(&command));
        let AppCommand::StartTail { generation, .. } = command else {
            panic!("expected start tail");
        };
        app.handle_event(AppEvent::LogLines {
            generation,
            lines: vec!["history".to_string()],
        });

        // Pause and resume
        assert_eq!(app.handle_key(key(KeyCode::Char('f'))), AppCommand::StopTail);
        assert!(!start_tail_backfill(&app.handle_key(key(KeyCode::Char('f')))));

        // The second stream is opened for the first time
        assert!(start_tail_backfill(&app.handle_key(key(KeyCode::F(2)))));

        // Back to the first stream, which still holds its lines
        assert!(!start_tail_backfill(&app.handle_key(key(KeyCode::F(1)))));
        let tail = app.log_view.as_ref().and_then(LogView::current).unwrap();
        assert_eq!(tail.lines().iter().collect::<Vec<_>>(), vec!["history"]);
    }

    #[test]
    fn test_closing_logs_returns_to_service_detail() {
        let mut app = test_app();
        open_detail(&mut app);
        assert_eq!(app.page, Page::ServiceDetail);

        app.handle_event(AppEvent::LogStreamsLoaded {
            log_group: "/ecs/orders".to_string(),
            group_arn: "arn:group".to_string(),
            result: Ok(vec!["web/web/0f1e2d3c".to_string()]),
        });
        assert_eq!(app.page, Page::Logs);

        assert_eq!(app.handle_key(key(KeyCode::Char('x'))), AppCommand::StopTail);
        assert_eq!(app.page, Page::ServiceDetail);
        assert!(app.detail.is_some());

        // Leaving the detail page still goes back to the list
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.page, Page::Services);
    }

    #[test]
    fn test_tail_ended_with_error() {
        let mut app = test_app();
        let command = app.handle_event(AppEvent::LogStreamsLoaded {
            log_group: "/ecs/orders".to_string(),
            group_arn: "arn:group".to_string(),
            result: Ok(vec!["s1".to_string()]),
        });
        let AppCommand::StartTail { generation, .. } = command else {
            panic!("expected start tail");
        };

        app.handle_event(AppEvent::TailEnded {
            generation,
            error: Some("session timed out".to_string()),
        });
        let tail = app.log_view.as_ref().and_then(LogView::current).unwrap();
        assert!(!tail.is_following());
        assert!(matches!(app.modal, Some(Modal::Message { .. })));
    }

    #[test]
    fn test_snapshot_loaded_replaces_and_clamps() {
        let mut app = test_app();
        app.services_selected = 2;

        let mut smaller = test_snapshot();
        smaller.services.truncate(1);
        app.handle_event(AppEvent::SnapshotLoaded(Ok(smaller)));

        assert_eq!(app.snapshot().services.len(), 1);
        assert_eq!(app.services_selected, 0);
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot() {
        let mut app = test_app();
        app.handle_event(AppEvent::SnapshotLoaded(Err("expired token".to_string())));
        assert_eq!(app.snapshot().services.len(), 3);
        assert!(matches!(app.modal, Some(Modal::Message { .. })));
    }

    #[test]
    fn test_should_refresh_disabled_in_config() {
        let mut app = test_app();
        app.config.behavior.refresh_interval = 0;
        std::thread::sleep(Duration::from_millis(5));
        assert!(!app.should_refresh());

        app.config.behavior.auto_refresh = true;
        assert!(app.should_refresh());
    }

    #[test]
    fn test_help_overlay_swallows_keys() {
        let mut app = test_app();
        app.handle_key(key(KeyCode::Char('?')));
        assert!(app.show_help);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppCommand::None);
        app.handle_key(key(KeyCode::Esc));
        assert!(!app.show_help);
    }
}
