//! Wire vocabulary: inbound frame classification and outbound notices.
//!
//! Frames are newline-delimited UTF-8 lines in both directions. The line
//! codec strips the terminator on the way in and appends it on the way out,
//! so everything here deals in bare lines.

use std::fmt;

use chrono::{Local, NaiveTime};

/// Prefix that marks an authentication frame.
pub const LOGIN_PREFIX: &str = "login:";

/// Sent ahead of the replayed history. Together with the line terminator
/// this renders as `"\nПоследние сообщения чата:\n"`.
pub const HISTORY_HEADER: &str = "\nПоследние сообщения чата:";

/// Default upper bound on a single inbound line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// One decoded inbound line, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFrame<'a> {
    /// `login:<candidate>`
    Login(&'a str),
    /// Anything else.
    Text(&'a str),
}

impl<'a> ClientFrame<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        match line.strip_prefix(LOGIN_PREFIX) {
            Some(candidate) => ClientFrame::Login(candidate),
            None => ClientFrame::Text(line),
        }
    }
}

pub fn rejection(login: &str) -> String {
    format!("Логин {login} занят, попробуйте другой")
}

pub fn greeting(login: &str) -> String {
    format!("Привет, {login}")
}

/// A broadcast chat message, rendered as `[HH:MM:SS] <login>: body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub timestamp: NaiveTime,
    pub login: String,
    pub body: String,
}

impl ChatRecord {
    /// Stamp a record with the current local wall-clock time.
    pub fn now(login: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().time(),
            login: login.into(),
            body: body.into(),
        }
    }
}

impl fmt::Display for ChatRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] <{}>: {}",
            self.timestamp.format("%H:%M:%S"),
            self.login,
            self.body
        )
    }
}

/// An item on a session's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Line(String),
    /// Flush what is queued, then close the write half.
    Close,
}
