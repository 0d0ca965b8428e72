//! One-shot user notifications.
//!
//! Controllers report each failure (and each completed mutation) exactly once
//! through a [`Notifier`]; whoever owns the receiver decides how to show it.

use std::fmt;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Error => tracing::warn!(%message, "notice"),
            _ => tracing::debug!(%level, %message, "notice"),
        }
        // Nobody listening is fine; the log line above still records it.
        let _ = self.tx.send(Notice { level, message });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(Level::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(Level::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(Level::Error, message);
    }
}
