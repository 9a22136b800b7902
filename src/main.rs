//! AWS Voyager - a terminal dashboard for ECS services, Lambda functions and
//! API Gateways.
//!
//! `main` loads the configuration and the first account snapshot, then runs
//! one async loop over terminal input, a tick timer and the results posted by
//! background workers. Workers own cloned AWS and GitHub clients and never
//! touch UI state; everything they produce comes back as an [`AppEvent`].

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use anyhow::{Context, Result};
use aws_sdk_cloudwatchlogs::types::StartLiveTailResponseStream;
use aws_voyager::app::{App, AppCommand, AppEvent};
use aws_voyager::aws::AwsClient;
use aws_voyager::cli::CliArgs;
use aws_voyager::config::{Config, LogsConfig};
use aws_voyager::github::GithubClient;
use aws_voyager::shell::{self, TuiTerminal};
use aws_voyager::snapshot::{load_service_detail, load_snapshot};
use aws_voyager::ui;
use clap::Parser;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(250);
const NO_BUCKET: &str = "No deployment bucket configured";

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args)?;

    let mut config = Config::load()?;
    if args.region.is_some() {
        config.aws.region = args.region.clone();
    }
    if args.profile.is_some() {
        config.aws.profile = args.profile.clone();
    }
    if args.cluster.is_some() {
        config.aws.cluster = args.cluster.clone();
    }

    let aws = AwsClient::new(config.aws.region.clone(), config.aws.profile.clone()).await?;
    let snapshot = load_snapshot(&aws, config.aws.cluster.as_deref())
        .await
        .context("Failed to load the initial account data")?;

    let github = if config.github.is_configured() {
        match GithubClient::from_gh_cli(config.github.clone()).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("GitHub integration disabled: {}", e);
                None
            }
        }
    } else {
        info!("GitHub integration not configured");
        None
    };

    let mut app = App::new(config, aws.region().to_string(), snapshot, github.is_some());
    let workers = Workers::new(aws, github, app.config.logs.clone());

    run(&mut app, workers).await
}

fn init_tracing(args: &CliArgs) -> Result<()> {
    let filter = match &args.log_filter {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(args.default_filter())),
    }
    .or_else(|_| EnvFilter::try_new("info"))
    .context("failed to initialize tracing filter")?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .with_context(|| format!("failed to open log file {}", args.log_file.display()))?;

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .compact()
        .try_init()
    {
        eprintln!("Logging to {} is disabled: {e}", args.log_file.display());
    }

    Ok(())
}

async fn run(app: &mut App, mut workers: Workers) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, &mut workers).await;
    workers.stop_tail();
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, app: &mut App, workers: &mut Workers) -> Result<()> {
    let mut reader = EventStream::new();
    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();

    loop {
        terminal
            .draw(|frame| ui::draw(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        let command = tokio::select! {
            maybe_event = reader.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    debug!("key={:?}", key.code);
                    app.handle_key(key)
                }
                Some(Ok(_)) => AppCommand::None,
                Some(Err(e)) => {
                    error!("terminal event error: {}", e);
                    AppCommand::None
                }
                None => {
                    warn!("terminal event stream closed");
                    break;
                }
            },
            _ = ticker.tick() => {
                if app.should_refresh() {
                    app.request_refresh()
                } else {
                    AppCommand::None
                }
            }
            Some(event) = rx.recv() => app.handle_event(event),
        };

        execute_command(terminal, app, workers, &tx, command).await;
    }

    Ok(())
}

/// Background work started by the loop.
struct Workers {
    aws: AwsClient,
    github: Option<GithubClient>,
    logs: LogsConfig,
    /// Consumer of the running live tail, aborted to unsubscribe
    tail: Option<JoinHandle<()>>,
}

impl Workers {
    fn new(aws: AwsClient, github: Option<GithubClient>, logs: LogsConfig) -> Self {
        Self {
            aws,
            github,
            logs,
            tail: None,
        }
    }

    fn stop_tail(&mut self) {
        if let Some(handle) = self.tail.take() {
            debug!("Stopping live tail");
            handle.abort();
        }
    }
}

fn report<T>(result: Result<T>, what: &str) -> Result<T, String> {
    result.map_err(|e| {
        error!("{} failed: {:#}", what, e);
        format!("{e:#}")
    })
}

fn post(tx: &UnboundedSender<AppEvent>, event: AppEvent) {
    if tx.send(event).is_err() {
        debug!("Event loop has stopped, dropping worker result");
    }
}

async fn execute_command(
    terminal: &mut TuiTerminal,
    app: &mut App,
    workers: &mut Workers,
    tx: &UnboundedSender<AppEvent>,
    command: AppCommand,
) {
    match command {
        AppCommand::None => {}
        AppCommand::Quit => workers.stop_tail(),
        AppCommand::Refresh => {
            let aws = workers.aws.clone();
            let cluster = app.snapshot().cluster_name.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = load_snapshot(&aws, Some(cluster.as_str())).await;
                post(&tx, AppEvent::SnapshotLoaded(report(result, "Refresh")));
            });
        }
        AppCommand::LoadServiceDetail { cluster, service } => {
            let aws = workers.aws.clone();
            let github = workers.github.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = load_service_detail(&aws, github.as_ref(), &cluster, &service).await;
                post(
                    &tx,
                    AppEvent::ServiceDetailLoaded {
                        result: report(result, "Loading service detail"),
                        service,
                    },
                );
            });
        }
        AppCommand::RestartService { cluster, service } => {
            let aws = workers.aws.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = aws
                    .restart_service(&cluster, &service)
                    .await
                    .map(|()| format!("Service {service} restarted successfully"));
                post(&tx, AppEvent::ActionFinished(report(result, "Service restart")));
            });
        }
        AppCommand::DeployService { cluster, service, image } => {
            let Some(github) = workers.github.clone() else {
                app.handle_event(AppEvent::ActionFinished(Err(
                    "GitHub integration is not configured".to_string(),
                )));
                return;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = github
                    .dispatch_workflow(&cluster, &service, &image)
                    .await
                    .map(|()| format!("Deployment of {image} to {service} started"))
                    .map_err(anyhow::Error::from);
                post(&tx, AppEvent::ActionFinished(report(result, "Service deploy")));
            });
        }
        AppCommand::FindLogStreams {
            log_group,
            group_arn,
            filter,
        } => {
            let aws = workers.aws.clone();
            let limit = workers.logs.stream_limit;
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = aws.log_streams(&log_group, &filter, limit).await;
                post(
                    &tx,
                    AppEvent::LogStreamsLoaded {
                        result: report(result, "Log stream lookup"),
                        log_group,
                        group_arn,
                    },
                );
            });
        }
        AppCommand::StartTail {
            log_group,
            group_arn,
            stream,
            generation,
            backfill,
        } => {
            workers.stop_tail();
            let aws = workers.aws.clone();
            let backfill = backfill.then(|| chrono::Duration::minutes(workers.logs.backfill_minutes));
            let tx = tx.clone();
            workers.tail = Some(tokio::spawn(async move {
                tail_stream(aws, tx, log_group, group_arn, stream, generation, backfill).await;
            }));
        }
        AppCommand::StopTail => workers.stop_tail(),
        AppCommand::OpenShell {
            cluster,
            task_arn,
            container,
        } => {
            let result = open_shell(terminal, &workers.aws, &cluster, &task_arn, &container)
                .await
                .map(|()| format!("Shell session in {container} ended"));
            app.handle_event(AppEvent::ActionFinished(report(result, "Shell")));
        }
        AppCommand::RestartFunction { function } => {
            let aws = workers.aws.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = aws
                    .restart_function(&function)
                    .await
                    .map(|()| format!("Lambda function {function} restarted successfully"));
                post(&tx, AppEvent::ActionFinished(report(result, "Function restart")));
            });
        }
        AppCommand::LoadFunctionVersions { function, architecture } => {
            let Some(bucket) = app.deploy_bucket().map(str::to_string) else {
                app.handle_event(AppEvent::FunctionVersionsLoaded {
                    function,
                    architecture,
                    result: Err(NO_BUCKET.to_string()),
                });
                return;
            };
            let aws = workers.aws.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = aws.available_versions(&bucket, &function).await;
                post(
                    &tx,
                    AppEvent::FunctionVersionsLoaded {
                        result: report(result, "Version lookup"),
                        function,
                        architecture,
                    },
                );
            });
        }
        AppCommand::DeployFunction {
            function,
            version,
            architecture,
        } => {
            let Some(bucket) = app.deploy_bucket().map(str::to_string) else {
                app.handle_event(AppEvent::ActionFinished(Err(NO_BUCKET.to_string())));
                return;
            };
            let aws = workers.aws.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = aws
                    .deploy_function(&function, &version, &bucket, architecture)
                    .await
                    .map(|()| format!("Deployed {version} to {function}"));
                post(&tx, AppEvent::ActionFinished(report(result, "Function deploy")));
            });
        }
    }
}

async fn open_shell(
    terminal: &mut TuiTerminal,
    aws: &AwsClient,
    cluster: &str,
    task_arn: &str,
    container: &str,
) -> Result<()> {
    let session = aws.execute_command(cluster, task_arn, container).await?;
    shell::open_shell(terminal, &session, aws.region()).await
}

/// Backfills the last minutes of a stream when asked to, then forwards live
/// tail updates until the session ends or the task is aborted.
async fn tail_stream(
    aws: AwsClient,
    tx: UnboundedSender<AppEvent>,
    log_group: String,
    group_arn: String,
    stream: String,
    generation: u64,
    backfill: Option<chrono::Duration>,
) {
    if let Some(backfill) = backfill {
        let since = chrono::Utc::now() - backfill;
        match aws.log_events(&log_group, &stream, since).await {
            Ok(events) => {
                let lines: Vec<String> = events
                    .iter()
                    .filter_map(|e| e.message().map(str::to_string))
                    .collect();
                if !lines.is_empty() {
                    post(&tx, AppEvent::LogLines { generation, lines });
                }
            }
            Err(e) => warn!("Backfill of {} failed: {:#}", stream, e),
        }
    }

    let mut output = match aws.start_live_tail(&group_arn, &stream).await {
        Ok(output) => output,
        Err(e) => {
            error!("{:#}", e);
            post(
                &tx,
                AppEvent::TailEnded {
                    generation,
                    error: Some(format!("{e:#}")),
                },
            );
            return;
        }
    };

    let error = loop {
        match output.response_stream.recv().await {
            Ok(Some(StartLiveTailResponseStream::SessionStart(start))) => {
                info!("Live tail session {} started", start.session_id().unwrap_or_default());
            }
            Ok(Some(StartLiveTailResponseStream::SessionUpdate(update))) => {
                let lines: Vec<String> = update
                    .session_results()
                    .iter()
                    .filter_map(|e| e.message().map(str::to_string))
                    .collect();
                if !lines.is_empty() && tx.send(AppEvent::LogLines { generation, lines }).is_err() {
                    return;
                }
            }
            Ok(Some(other)) => debug!("Ignoring live tail event {:?}", other),
            Ok(None) => break None,
            Err(e) => {
                error!("Live tail of {} failed: {}", stream, e);
                break Some(e.to_string());
            }
        }
    };

    post(&tx, AppEvent::TailEnded { generation, error });
}
