//! Interactive container shells through `session-manager-plugin`.
//!
//! ECS ExecuteCommand only opens an SSM session; the terminal side is handled by
//! the session manager plugin, which is run as a child process owning the tty
//! while the dashboard is suspended.

use std::io::Stdout;
use std::process::Stdio;

use anyhow::{Context, Result};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const PLUGIN: &str = "session-manager-plugin";

/// Session returned by ECS ExecuteCommand, in the shape the plugin expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSession {
    #[serde(rename = "SessionId")]
    pub session_id: String,
    #[serde(rename = "StreamUrl")]
    pub stream_url: String,
    #[serde(rename = "TokenValue")]
    pub token_value: String,
}

/// Arguments passed to the plugin for a session.
pub fn plugin_args(session: &ExecSession, region: &str) -> Result<Vec<String>> {
    let json = serde_json::to_string(session).context("Failed to encode exec session")?;
    Ok(vec![json, region.to_string(), "StartSession".to_string()])
}

/// Hands the terminal to `session-manager-plugin` until the shell exits.
///
/// The TUI is suspended for the duration and restored afterwards, also when
/// the plugin could not be started.
///
/// # Errors
/// Fails when the plugin is missing, exits with a non-zero status, or the
/// terminal cannot be suspended or restored.
pub async fn open_shell(terminal: &mut TuiTerminal, session: &ExecSession, region: &str) -> Result<()> {
    let args = plugin_args(session, region)?;
    tracing::info!("Starting {} for session {}", PLUGIN, session.session_id);

    suspend_terminal_for_subprocess(terminal)?;

    let run_result = Command::new(PLUGIN)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to run {PLUGIN}, is it installed and on PATH?"));
    let restore_result = resume_terminal_after_subprocess(terminal);

    let status = match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => {
            return Err(anyhow::anyhow!(
                "{run_error:#}\nterminal resume error: {restore_error:#}"
            ));
        }
        (Err(error), _) => return Err(error),
        (_, Err(error)) => return Err(error),
        (Ok(status), Ok(())) => status,
    };

    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{PLUGIN} exited with {status}"))
    }
}

fn suspend_terminal_for_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode for shell")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen for shell")?;
    terminal
        .show_cursor()
        .context("Failed to show cursor for shell")?;
    Ok(())
}

fn resume_terminal_after_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    enable_raw_mode().context("Failed to re-enable raw mode after shell")?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)
        .context("Failed to re-enter alternate screen after shell")?;
    terminal
        .clear()
        .context("Failed to clear terminal after shell")?;
    Ok(())
}
