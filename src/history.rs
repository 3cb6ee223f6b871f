//! Recent link transactions, kept for diagnostics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::types::LightId;

/// What a link transaction was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Handshake,
    Poll,
    Command,
}

/// How a link transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionResult {
    Ok,
    Timeout,
    Unreachable,
    DeviceError,
    BadReply,
}

impl TransactionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, TransactionResult::Ok)
    }

    pub(crate) fn of<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => TransactionResult::Ok,
            Err(Error::Timeout) => TransactionResult::Timeout,
            Err(Error::Device { .. }) => TransactionResult::DeviceError,
            Err(Error::JsonLoad(_) | Error::Utf8Decode(_)) => TransactionResult::BadReply,
            Err(_) => TransactionResult::Unreachable,
        }
    }
}

/// A recorded transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: TransactionKind,
    pub method: String,
    pub light: Option<LightId>,
    pub result: TransactionResult,
    /// Round trip in milliseconds; zero when rejected without I/O
    pub latency_ms: u64,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Bounded log of the most recent transactions.
#[derive(Debug, Clone)]
pub struct TransactionHistory {
    entries: VecDeque<HistoryEntry>,
    last_error: Option<String>,
    start_time: Instant,
    max_entries: usize,
}

impl Default for TransactionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            last_error: None,
            start_time: Instant::now(),
            max_entries,
        }
    }

    pub fn record(
        &mut self,
        kind: TransactionKind,
        method: &str,
        light: Option<LightId>,
        result: TransactionResult,
        latency: Duration,
    ) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            kind,
            method: method.to_string(),
            light,
            result,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_transaction() {
        let mut history = TransactionHistory::new();
        history.record(
            TransactionKind::Command,
            "setLight",
            Some(LightId(2)),
            TransactionResult::Ok,
            Duration::from_millis(12),
        );

        assert_eq!(history.len(), 1);
        let entry = history.entries().next().unwrap();
        assert_eq!(entry.light, Some(LightId(2)));
        assert_eq!(entry.latency_ms, 12);
    }

    #[test]
    fn test_record_error() {
        let mut history = TransactionHistory::new();
        history.record_error("lighting module did not answer in time");
        assert_eq!(
            history.last_error(),
            Some("lighting module did not answer in time")
        );
    }

    #[test]
    fn test_max_entries() {
        let mut history = TransactionHistory::with_max_entries(2);
        for i in 0..5 {
            history.record(
                TransactionKind::Poll,
                &format!("method{}", i),
                None,
                TransactionResult::Ok,
                Duration::ZERO,
            );
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries().next().unwrap().method, "method3");
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut history = TransactionHistory::with_max_entries(0);
        history.record(
            TransactionKind::Handshake,
            "getModuleInfo",
            None,
            TransactionResult::Timeout,
            Duration::ZERO,
        );
        assert!(history.is_empty());
    }
}
