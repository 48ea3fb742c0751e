use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: String,
    pub level: LogLevel,
    pub message: String,
}

/// Destination for user-facing diagnostics, such as absorbed failures.
pub trait LogSink: Send + Sync {
    fn record(&self, level: LogLevel, message: &str);
}

/// Ring buffer of the most recent entries; the oldest entry is evicted once
/// `capacity` is reached.
pub struct DebugLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl DebugLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogSink for DebugLog {
    fn record(&self, level: LogLevel, message: &str) {
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            at: Utc::now().to_rfc3339(),
            level,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let log = DebugLog::new(10);
        log.record(LogLevel::Info, "first");
        log.record(LogLevel::Error, "second");
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].level, LogLevel::Error);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = DebugLog::new(3);
        for i in 0..5 {
            log.record(LogLevel::Warn, &format!("entry {i}"));
        }
        let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let log = DebugLog::new(0);
        log.record(LogLevel::Info, "a");
        log.record(LogLevel::Info, "b");
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "b");
    }

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
    }
}
