//! User-facing notifications.
//!
//! The controller emits typed [`Notice`] events into a channel; whoever owns the
//! receiving end decides how to present them.

use std::fmt;
use std::sync::mpsc::Sender;

use chrono::{DateTime, Local};

/// Notice appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Default,
    Destructive,
}

/// A transient notification.
#[derive(Debug, Clone)]
pub struct Notice {
    pub timestamp: DateTime<Local>,
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self.variant {
            Variant::Default => "+",
            Variant::Destructive => "!",
        };
        write!(
            f,
            "[{}] {} {}: {}",
            self.timestamp.format("%H:%M:%S"),
            mark,
            self.title,
            self.description
        )
    }
}

/// Sending half of the notice queue.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<Notice>,
}

impl Notifier {
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx }
    }

    /// Emit a success notice.
    pub fn success(&self, title: &str, description: &str) {
        log::info!("{}: {}", title, description);
        self.push(title, description, Variant::Default);
    }

    /// Emit an error notice.
    pub fn error(&self, title: &str, description: &str) {
        log::warn!("{}: {}", title, description);
        self.push(title, description, Variant::Destructive);
    }

    fn push(&self, title: &str, description: &str, variant: Variant) {
        let notice = Notice {
            timestamp: Local::now(),
            title: title.to_owned(),
            description: description.to_owned(),
            variant,
        };
        // A dropped receiver only means nobody is displaying notices any more.
        if self.tx.send(notice).is_err() {
            log::debug!("Notice receiver gone, dropping notice");
        }
    }
}
