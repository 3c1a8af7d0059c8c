//! Per-script run log

use edkit_services::QueueSender;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Severity of a log entry, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Status,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Status => "status",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Identifies one loaded script. Reloading gives every script a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptId(u64);

impl ScriptId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Log of a script's most recent run.
///
/// The first entry after a notification was delivered posts the script id
/// to the main queue; further entries ride along with that notification.
#[derive(Debug)]
pub struct ScriptLog {
    script: ScriptId,
    title: RefCell<String>,
    entries: RefCell<Vec<LogEntry>>,
    queued: Cell<bool>,
    muted: Cell<bool>,
    notify: Option<QueueSender<ScriptId>>,
}

impl ScriptLog {
    pub fn new(script: ScriptId, title: &str, notify: Option<QueueSender<ScriptId>>) -> Self {
        Self {
            script,
            title: RefCell::new(title.to_owned()),
            entries: RefCell::new(Vec::new()),
            queued: Cell::new(false),
            muted: Cell::new(false),
            notify,
        }
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        {
            let title = self.title.borrow();
            match level {
                LogLevel::Status | LogLevel::Info => {
                    tracing::info!(target: "script", script = %title, %level, "{message}")
                }
                LogLevel::Warning => tracing::warn!(target: "script", script = %title, "{message}"),
                LogLevel::Error => tracing::error!(target: "script", script = %title, "{message}"),
            }
        }
        self.entries.borrow_mut().push(LogEntry { level, message });

        if self.muted.get() || self.queued.replace(true) {
            return;
        }
        if let Some(notify) = &self.notify {
            notify.post(self.script);
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Highest severity logged; `Status` when empty.
    pub fn severity(&self) -> LogLevel {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.level)
            .max()
            .unwrap_or(LogLevel::Status)
    }

    pub(crate) fn set_title(&self, title: &str) {
        title.clone_into(&mut self.title.borrow_mut());
    }

    /// Log without posting notifications while `f` runs.
    pub(crate) fn muted<R>(&self, f: impl FnOnce() -> R) -> R {
        self.muted.set(true);
        let result = f();
        self.muted.set(false);
        result
    }

    /// Called when the pending notification is delivered.
    pub(crate) fn clear_queued(&self) {
        self.queued.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edkit_services::MainQueue;

    #[test]
    fn severity_is_the_maximum() {
        let log = ScriptLog::new(ScriptId::next(), "test", None);
        assert_eq!(log.severity(), LogLevel::Status);

        log.push(LogLevel::Warning, "careful");
        log.push(LogLevel::Info, "hello");
        assert_eq!(log.severity(), LogLevel::Warning);

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.severity(), LogLevel::Status);
    }

    #[test]
    fn notifications_are_coalesced_until_delivered() {
        let queue = MainQueue::new();
        let id = ScriptId::next();
        let log = ScriptLog::new(id, "test", Some(queue.sender()));

        log.push(LogLevel::Info, "one");
        log.push(LogLevel::Info, "two");
        assert_eq!(queue.drain(), vec![id]);

        log.clear_queued();
        log.push(LogLevel::Error, "three");
        assert_eq!(queue.drain(), vec![id]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn muted_entries_post_nothing() {
        let queue = MainQueue::new();
        let log = ScriptLog::new(ScriptId::next(), "test", Some(queue.sender()));

        log.muted(|| log.push(LogLevel::Error, "bad tag"));
        assert!(queue.drain().is_empty());
        assert_eq!(log.entries()[0].message, "bad tag");
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ScriptId::next(), ScriptId::next());
    }
}
