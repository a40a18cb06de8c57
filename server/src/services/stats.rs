//! Counters shared between the oracle loop and the health endpoint

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::chain::SubmissionOutcome;
use crate::models::LogPosition;

#[derive(Debug, Default)]
pub struct OracleStats {
    connected: AtomicBool,
    events_received: AtomicU64,
    events_matched: AtomicU64,
    submissions_accepted: AtomicU64,
    submissions_rejected: AtomicU64,
    submissions_unknown: AtomicU64,
    submissions_not_sent: AtomicU64,
    transport_errors: AtomicU64,
    reconnects: AtomicU64,
    last_acknowledged: Mutex<Option<LogPosition>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connected: bool,
    pub events_received: u64,
    pub events_matched: u64,
    pub submissions_accepted: u64,
    pub submissions_rejected: u64,
    pub submissions_unknown: u64,
    pub submissions_not_sent: u64,
    pub transport_errors: u64,
    pub reconnects: u64,
    pub last_acknowledged: Option<LogPosition>,
}

impl OracleStats {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn record_event(&self, matched: bool) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.events_matched.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_submission(&self, outcome: &SubmissionOutcome) {
        let counter = match outcome {
            SubmissionOutcome::Accepted { .. } => &self.submissions_accepted,
            SubmissionOutcome::Rejected { .. } => &self.submissions_rejected,
            SubmissionOutcome::Unknown { .. } => &self.submissions_unknown,
            SubmissionOutcome::NotSent { .. } => &self.submissions_not_sent,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        self.set_connected(false);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn acknowledge(&self, position: LogPosition) {
        if let Ok(mut last) = self.last_acknowledged.lock() {
            *last = Some(position);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_matched: self.events_matched.load(Ordering::Relaxed),
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            submissions_unknown: self.submissions_unknown.load(Ordering::Relaxed),
            submissions_not_sent: self.submissions_not_sent.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_acknowledged: self.last_acknowledged.lock().ok().and_then(|last| *last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RejectionKind;
    use ethabi::Hash;

    #[test]
    fn counts_outcomes_by_kind() {
        let stats = OracleStats::default();
        stats.record_event(true);
        stats.record_event(false);
        stats.record_submission(&SubmissionOutcome::Accepted {
            tx_hash: Hash::zero(),
        });
        stats.record_submission(&SubmissionOutcome::Rejected {
            kind: RejectionKind::Terminal,
            reason: "revert".to_string(),
        });
        stats.acknowledge(LogPosition {
            block_number: 4,
            log_index: 0,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.events_matched, 1);
        assert_eq!(snapshot.submissions_accepted, 1);
        assert_eq!(snapshot.submissions_rejected, 1);
        assert_eq!(snapshot.submissions_unknown, 0);
        assert_eq!(snapshot.last_acknowledged.map(|p| p.block_number), Some(4));
    }

    #[test]
    fn transport_errors_mark_disconnected() {
        let stats = OracleStats::default();
        stats.set_connected(true);
        stats.record_transport_error();
        let snapshot = stats.snapshot();
        assert!(!snapshot.connected);
        assert_eq!(snapshot.transport_errors, 1);
    }
}
