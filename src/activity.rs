//! Human-readable record of notable transitions.
//!
//! Lines here are meant for the user (the "log" pane of a front end), while
//! `tracing` output is meant for whoever is debugging the tool.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

/// Oldest lines are dropped past this many
const MAX_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct ActivityLine {
    pub at: DateTime<Local>,
    pub level: ActivityLevel,
    pub message: String,
}

impl fmt::Display for ActivityLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

#[derive(Debug, Default)]
pub struct ActivityLog {
    lines: VecDeque<ActivityLine>,
}

impl ActivityLog {
    pub fn info(&mut self, message: impl Into<String>) {
        self.push(ActivityLevel::Info, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(ActivityLevel::Error, message.into());
    }

    fn push(&mut self, level: ActivityLevel, message: String) {
        if self.lines.len() == MAX_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(ActivityLine {
            at: Local::now(),
            level,
            message,
        });
    }

    pub fn lines(&self) -> impl Iterator<Item = &ActivityLine> {
        self.lines.iter()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&mut self) -> Vec<ActivityLine> {
        self.lines.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
