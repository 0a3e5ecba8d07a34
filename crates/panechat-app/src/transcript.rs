//! Chat panel contents.

use std::fmt::Write as _;

use chrono::Local;
use clap::ValueEnum;

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Which messages carry a timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TimestampMode {
    #[default]
    None,
    User,
    Llm,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub role: Role,
    pub text: String,
    /// Placeholder shown until a reply arrives.
    pub temporary: bool,
}

/// Ordered, rendered chat history. Never persisted.
#[derive(Debug)]
pub struct Transcript {
    entries: Vec<Entry>,
    mode: TimestampMode,
    format: String,
}

impl Transcript {
    pub fn new(mode: TimestampMode, format: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            mode,
            format: format.into(),
        }
    }

    pub fn user(&mut self, text: &str) {
        self.push(Role::User, text, false);
    }

    pub fn assistant(&mut self, text: &str) {
        self.push(Role::Assistant, text, false);
    }

    pub fn system(&mut self, text: &str) {
        self.push(Role::System, text, false);
    }

    pub fn error(&mut self, text: &str) {
        self.system(&format!("[Error: {text}]"));
    }

    /// Show `[Thinking...]` until [`clear_temporary`](Self::clear_temporary).
    pub fn thinking(&mut self) {
        self.push(Role::Assistant, "[Thinking...]", true);
    }

    pub fn clear_temporary(&mut self) {
        self.entries.retain(|entry| !entry.temporary);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Display text, one string per message. Messages may span lines.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.text.clone()).collect()
    }

    fn push(&mut self, role: Role, text: &str, temporary: bool) {
        let stamped = match (self.mode, role) {
            (TimestampMode::User | TimestampMode::Both, Role::User)
            | (TimestampMode::Llm | TimestampMode::Both, Role::Assistant) => self.timestamp(),
            _ => String::new(),
        };
        let label = match role {
            Role::User => "You: ",
            Role::Assistant => "LLM: ",
            Role::System => "[System] ",
        };
        self.entries.push(Entry {
            role,
            text: format!("{stamped}{label}{text}"),
            temporary,
        });
    }

    fn timestamp(&self) -> String {
        let now = Local::now();
        let mut stamp = String::new();
        // chrono reports unknown specifiers as a formatting error.
        if write!(stamp, "[{}] ", now.format(&self.format)).is_err() {
            stamp.clear();
            let _ = write!(stamp, "[{}] ", now.format(DEFAULT_TIMESTAMP_FORMAT));
        }
        stamp
    }
}
