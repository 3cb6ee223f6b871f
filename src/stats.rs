//! Observability counters for the lighting link.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::history::{TransactionHistory, TransactionKind, TransactionResult};
use crate::locked;
use crate::types::LightId;

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub commands_sent: u64,
    pub commands_succeeded: u64,
    pub commands_failed: u64,
    pub commands_superseded: u64,
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub handshakes_succeeded: u64,
    pub handshakes_failed: u64,
    pub timeouts: u64,
    pub unreachable: u64,
    pub device_errors: u64,
    pub bad_replies: u64,
}

/// Observes every transaction the link performs.
///
/// Counters are monotonic for the life of the process. Uptime is measured
/// from the first time the module became connected.
#[derive(Debug)]
pub struct StatusAggregator {
    commands_sent: AtomicU64,
    commands_succeeded: AtomicU64,
    commands_failed: AtomicU64,
    commands_superseded: AtomicU64,
    polls_succeeded: AtomicU64,
    polls_failed: AtomicU64,
    handshakes_succeeded: AtomicU64,
    handshakes_failed: AtomicU64,
    timeouts: AtomicU64,
    unreachable: AtomicU64,
    device_errors: AtomicU64,
    bad_replies: AtomicU64,
    connected_since: OnceLock<Instant>,
    history: Mutex<TransactionHistory>,
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new(TransactionHistory::DEFAULT_MAX_ENTRIES)
    }
}

impl StatusAggregator {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            commands_sent: AtomicU64::new(0),
            commands_succeeded: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            commands_superseded: AtomicU64::new(0),
            polls_succeeded: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            handshakes_succeeded: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            unreachable: AtomicU64::new(0),
            device_errors: AtomicU64::new(0),
            bad_replies: AtomicU64::new(0),
            connected_since: OnceLock::new(),
            history: Mutex::new(TransactionHistory::with_max_entries(history_capacity)),
        }
    }

    /// Record one finished link transaction.
    pub(crate) fn record<T>(
        &self,
        kind: TransactionKind,
        method: &str,
        light: Option<LightId>,
        result: &Result<T, Error>,
        latency: Duration,
    ) {
        let outcome = TransactionResult::of(result);
        let ok = outcome.is_ok();

        let (total, good, bad) = match kind {
            TransactionKind::Command => (
                Some(&self.commands_sent),
                &self.commands_succeeded,
                &self.commands_failed,
            ),
            TransactionKind::Poll => (None, &self.polls_succeeded, &self.polls_failed),
            TransactionKind::Handshake => {
                (None, &self.handshakes_succeeded, &self.handshakes_failed)
            }
        };
        if let Some(total) = total {
            bump(total);
        }
        bump(if ok { good } else { bad });

        match outcome {
            TransactionResult::Ok => {}
            TransactionResult::Timeout => bump(&self.timeouts),
            TransactionResult::Unreachable => bump(&self.unreachable),
            TransactionResult::DeviceError => bump(&self.device_errors),
            TransactionResult::BadReply => bump(&self.bad_replies),
        }

        let mut history = locked(&self.history);
        history.record(kind, method, light, outcome, latency);
        if let Err(e) = result {
            history.record_error(&e.to_string());
        }
    }

    /// Record a request refused before any I/O because the link is down.
    /// It shows up under `unreachable` and in the history, not in the
    /// command totals.
    pub(crate) fn record_refused(&self, kind: TransactionKind, method: &str, light: Option<LightId>) {
        bump(&self.unreachable);
        let mut history = locked(&self.history);
        history.record(kind, method, light, TransactionResult::Unreachable, Duration::ZERO);
        history.record_error(&Error::Unreachable.to_string());
    }

    /// Count a command that was voided by a newer one.
    pub(crate) fn record_superseded(&self) {
        bump(&self.commands_superseded);
    }

    /// Remember when the module first came up. Later calls are ignored.
    pub(crate) fn mark_connected(&self) {
        let _ = self.connected_since.set(Instant::now());
    }

    pub fn counters(&self) -> Counters {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Counters {
            commands_sent: load(&self.commands_sent),
            commands_succeeded: load(&self.commands_succeeded),
            commands_failed: load(&self.commands_failed),
            commands_superseded: load(&self.commands_superseded),
            polls_succeeded: load(&self.polls_succeeded),
            polls_failed: load(&self.polls_failed),
            handshakes_succeeded: load(&self.handshakes_succeeded),
            handshakes_failed: load(&self.handshakes_failed),
            timeouts: load(&self.timeouts),
            unreachable: load(&self.unreachable),
            device_errors: load(&self.device_errors),
            bad_replies: load(&self.bad_replies),
        }
    }

    /// Time since the module first became connected.
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_since.get().map(Instant::elapsed)
    }

    pub fn history(&self) -> TransactionHistory {
        locked(&self.history).clone()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Render an uptime the way the dashboard shows it, e.g. `7d 14h 32m`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use cuehall_lights::format_uptime;
///
/// let uptime = Duration::from_secs(7 * 86_400 + 14 * 3_600 + 32 * 60 + 9);
/// assert_eq!(format_uptime(uptime), "7d 14h 32m");
/// assert_eq!(format_uptime(Duration::from_secs(3_660)), "1h 1m");
/// assert_eq!(format_uptime(Duration::from_secs(59)), "0m");
/// ```
pub fn format_uptime(uptime: Duration) -> String {
    let minutes = uptime.as_secs() / 60;
    let (days, hours, minutes) = (minutes / 1440, (minutes / 60) % 24, minutes % 60);
    match (days, hours) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h {minutes}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tallies() {
        let stats = StatusAggregator::default();
        let ok: Result<(), Error> = Ok(());
        let timeout: Result<(), Error> = Err(Error::Timeout);
        let rejected: Result<(), Error> = Err(Error::device(-32602, "Invalid params"));

        stats.record(TransactionKind::Command, "setLight", Some(LightId(1)), &ok, Duration::ZERO);
        stats.record(TransactionKind::Command, "setLight", Some(LightId(1)), &timeout, Duration::ZERO);
        stats.record(TransactionKind::Command, "setLight", Some(LightId(2)), &rejected, Duration::ZERO);

        let counters = stats.counters();
        assert_eq!(counters.commands_sent, 3);
        assert_eq!(counters.commands_succeeded, 1);
        assert_eq!(counters.commands_failed, 2);
        assert_eq!(counters.timeouts, 1);
        assert_eq!(counters.device_errors, 1);
        assert_eq!(stats.history().len(), 3);
        assert!(stats.history().last_error().unwrap().contains("Invalid params"));
    }

    #[test]
    fn test_polls_do_not_count_as_commands() {
        let stats = StatusAggregator::default();
        let down: Result<(), Error> = Err(Error::Unreachable);
        stats.record(TransactionKind::Poll, "getLights", None, &down, Duration::ZERO);
        stats.record_superseded();

        let counters = stats.counters();
        assert_eq!(counters.commands_sent, 0);
        assert_eq!(counters.polls_failed, 1);
        assert_eq!(counters.unreachable, 1);
        assert_eq!(counters.commands_superseded, 1);
    }

    #[test]
    fn test_refused_requests_stay_out_of_command_totals() {
        let stats = StatusAggregator::default();
        stats.record_refused(TransactionKind::Command, "setLight", Some(LightId(4)));

        let counters = stats.counters();
        assert_eq!(counters.commands_sent, 0);
        assert_eq!(counters.commands_failed, 0);
        assert_eq!(counters.unreachable, 1);
        assert_eq!(stats.history().len(), 1);
    }

    #[test]
    fn test_uptime_starts_at_first_connect() {
        let stats = StatusAggregator::default();
        assert!(stats.uptime().is_none());
        stats.mark_connected();
        let first = stats.uptime().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        stats.mark_connected();
        assert!(stats.uptime().unwrap() >= first + Duration::from_millis(5));
    }
}
