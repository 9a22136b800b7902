//! Live tail of CloudWatch log streams.
//!
//! [`LogTail`] is the state of one stream: a bounded line buffer plus the
//! follow/wrap/scroll flags. State changes that need the network return a
//! [`TailCommand`] instead of performing it; the event loop starts or stops the
//! live tail consumer accordingly. Each subscription gets a fresh generation
//! and lines carrying any other generation are dropped, so output from a
//! consumer that was already stopped never reaches the buffer.
//!
//! [`LogView`] groups the tails of all recent streams in one log group.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Idle,
    Streaming,
    Paused,
    Closed,
}

/// Side effect requested by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailCommand {
    /// Start a live tail from "now" whose lines are tagged with `generation`.
    /// With `backfill` the recent history of the stream is loaded first; only
    /// the first open of an empty tail asks for it.
    Subscribe { generation: u64, backfill: bool },
    /// Stop the running live tail.
    Unsubscribe,
}

fn next_generation() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct LogTail {
    group_arn: String,
    stream: String,
    state: TailState,
    lines: VecDeque<String>,
    max_lines: usize,
    follow: bool,
    wrap: bool,
    /// Lines scrolled back from the end; always 0 while following.
    scroll_back: usize,
    generation: u64,
}

impl LogTail {
    pub fn new(group_arn: impl Into<String>, stream: impl Into<String>, max_lines: usize) -> Self {
        Self {
            group_arn: group_arn.into(),
            stream: stream.into(),
            state: TailState::Idle,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
            max_lines: max_lines.max(1),
            follow: false,
            wrap: false,
            scroll_back: 0,
            generation: 0,
        }
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn group_arn(&self) -> &str {
        &self.group_arn
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrap
    }

    pub fn lines(&self) -> &VecDeque<String> {
        &self.lines
    }

    /// Starts streaming. Idle and closed tails can be opened; the buffer of a
    /// closed tail is kept so reopening shows the earlier lines.
    pub fn open(&mut self) -> Option<TailCommand> {
        match self.state {
            TailState::Idle | TailState::Closed => {
                let backfill = self.state == TailState::Idle && self.lines.is_empty();
                self.follow = true;
                self.scroll_back = 0;
                Some(self.subscribe(backfill))
            }
            TailState::Streaming | TailState::Paused => None,
        }
    }

    /// Turns following on or off.
    ///
    /// Turning it off pauses the tail and closes the live stream. Turning it on
    /// again resubscribes; lines written while paused are not fetched.
    pub fn set_follow(&mut self, follow: bool) -> Option<TailCommand> {
        match (self.state, follow) {
            (TailState::Streaming, false) => {
                self.follow = false;
                self.state = TailState::Paused;
                Some(TailCommand::Unsubscribe)
            }
            (TailState::Paused, true) => {
                self.follow = true;
                self.scroll_back = 0;
                Some(self.subscribe(false))
            }
            _ => None,
        }
    }

    pub fn toggle_follow(&mut self) -> Option<TailCommand> {
        self.set_follow(!self.follow)
    }

    pub fn toggle_wrap(&mut self) {
        self.wrap = !self.wrap;
    }

    /// Closes the tail. Only a streaming tail has a live stream to stop.
    pub fn close(&mut self) -> Option<TailCommand> {
        let was_streaming = self.state == TailState::Streaming;
        self.state = TailState::Closed;
        self.follow = false;
        was_streaming.then_some(TailCommand::Unsubscribe)
    }

    fn subscribe(&mut self, backfill: bool) -> TailCommand {
        self.state = TailState::Streaming;
        self.generation = next_generation();
        TailCommand::Subscribe {
            generation: self.generation,
            backfill,
        }
    }

    /// Appends lines from the subscription `generation`.
    ///
    /// Returns false and drops the lines when they belong to an older
    /// subscription or the tail is not streaming.
    pub fn push_lines<I>(&mut self, generation: u64, lines: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        if self.state != TailState::Streaming || generation != self.generation {
            return false;
        }

        for line in lines {
            self.lines.push_back(strip_newlines(&line));
        }
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
        true
    }

    pub fn scroll_up(&mut self) {
        if !self.follow {
            self.scroll_back = (self.scroll_back + 1).min(self.lines.len().saturating_sub(1));
        }
    }

    pub fn scroll_down(&mut self) {
        self.scroll_back = self.scroll_back.saturating_sub(1);
    }

    /// Index of the first line shown in a viewport of `height` lines.
    ///
    /// While following this pins the last line to the bottom of the view.
    pub fn first_visible(&self, height: usize) -> usize {
        let scroll_back = if self.follow { 0 } else { self.scroll_back };
        self.lines.len().saturating_sub(height + scroll_back)
    }

    /// Title of the log panel: ` {arn} (N rows, tail, wrap) `.
    pub fn title(&self) -> String {
        let mut flags = format!("{} rows", self.lines.len());
        if self.follow {
            flags.push_str(", tail");
        }
        if self.wrap {
            flags.push_str(", wrap");
        }
        format!(" {} ({flags}) ", self.group_arn)
    }
}

fn strip_newlines(line: &str) -> String {
    line.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

fn timestamp_regex() -> Option<&'static Regex> {
    static TIMESTAMP: OnceLock<Option<Regex>> = OnceLock::new();
    TIMESTAMP
        .get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z").ok())
        .as_ref()
}

/// Splits a line into segments, flagging ISO-8601 timestamps for highlighting.
pub fn split_timestamps(line: &str) -> Vec<(&str, bool)> {
    let mut parts = Vec::new();
    let mut last = 0;

    let Some(regex) = timestamp_regex() else {
        if !line.is_empty() {
            parts.push((line, false));
        }
        return parts;
    };

    for m in regex.find_iter(line) {
        if m.start() > last {
            parts.push((&line[last..m.start()], false));
        }
        parts.push((m.as_str(), true));
        last = m.end();
    }
    if last < line.len() {
        parts.push((&line[last..], false));
    }
    parts
}

/// The tails of all recent streams in one log group.
#[derive(Debug, Clone)]
pub struct LogView {
    log_group: String,
    tails: Vec<LogTail>,
    selected: usize,
}

impl LogView {
    /// Creates a view with one idle tail per stream.
    pub fn new(
        log_group: impl Into<String>,
        group_arn: &str,
        streams: Vec<String>,
        max_lines: usize,
    ) -> Self {
        Self {
            log_group: log_group.into(),
            tails: streams
                .into_iter()
                .map(|stream| LogTail::new(group_arn, stream, max_lines))
                .collect(),
            selected: 0,
        }
    }

    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.tails.iter().map(LogTail::stream)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn current(&self) -> Option<&LogTail> {
        self.tails.get(self.selected)
    }

    pub fn current_mut(&mut self) -> Option<&mut LogTail> {
        self.tails.get_mut(self.selected)
    }

    /// Opens the first stream.
    pub fn open(&mut self) -> Option<TailCommand> {
        self.current_mut().and_then(LogTail::open)
    }

    /// Switches to stream `index`, closing the current one.
    ///
    /// Returns the commands in the order they must be carried out.
    pub fn select(&mut self, index: usize) -> Vec<TailCommand> {
        if index == self.selected || index >= self.tails.len() {
            return Vec::new();
        }

        let mut commands = Vec::new();
        commands.extend(self.current_mut().and_then(LogTail::close));
        self.selected = index;
        commands.extend(self.current_mut().and_then(LogTail::open));
        commands
    }

    /// Closes the stream being shown.
    pub fn close(&mut self) -> Option<TailCommand> {
        self.current_mut().and_then(LogTail::close)
    }

    /// Routes lines to the current tail. Lines of any other subscription are dropped.
    pub fn push_lines(&mut self, generation: u64, lines: Vec<String>) -> bool {
        match self.current_mut() {
            Some(tail) => tail.push_lines(generation, lines),
            None => false,
        }
    }
}
