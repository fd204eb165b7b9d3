//! Counters for scan and clean runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cleaner::protocol::{CleanMethod, DeletionOutcome};

/// Aggregated result of one or more scan/clean passes.
///
/// The engine keeps a running instance across its lifetime and also returns
/// a per-call instance from each clean pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningStats {
    /// Keys visited during scanning.
    pub total_scanned: u64,
    /// Issues reported by the scanners.
    pub issues_found: u64,
    /// Issues removed, by any method.
    pub issues_cleaned: u64,
    /// Issues that survived every applicable delete attempt.
    pub issues_failed: u64,
    /// Issues the protection gate or severity rule held back.
    pub issues_skipped: u64,
    /// Cleaned entries that needed ownership/ACL escalation.
    pub forced_deletes: u64,
    /// Node deletions deferred to the next boot.
    pub scheduled_for_reboot: u64,
    /// Wall-clock time spent scanning.
    pub scan_duration: Duration,
    /// Wall-clock time spent cleaning.
    pub clean_duration: Duration,
    /// Full paths of the entries that could not be removed.
    pub failed_items: Vec<String>,
}

impl CleaningStats {
    /// Fold one protocol outcome into the counters.
    pub fn record(&mut self, outcome: DeletionOutcome, item: &str) {
        match outcome {
            DeletionOutcome::Cleaned(method) => {
                self.issues_cleaned += 1;
                match method {
                    CleanMethod::Normal => {}
                    CleanMethod::Forced => self.forced_deletes += 1,
                    CleanMethod::RebootScheduled => self.scheduled_for_reboot += 1,
                }
            }
            DeletionOutcome::Skipped(_) => self.issues_skipped += 1,
            DeletionOutcome::Failed => {
                self.issues_failed += 1;
                self.failed_items.push(item.to_string());
            }
        }
    }

    /// Fold a per-call result into a running total.
    pub fn merge(&mut self, other: &Self) {
        self.total_scanned += other.total_scanned;
        self.issues_found += other.issues_found;
        self.issues_cleaned += other.issues_cleaned;
        self.issues_failed += other.issues_failed;
        self.issues_skipped += other.issues_skipped;
        self.forced_deletes += other.forced_deletes;
        self.scheduled_for_reboot += other.scheduled_for_reboot;
        self.scan_duration += other.scan_duration;
        self.clean_duration += other.clean_duration;
        self.failed_items.extend(other.failed_items.iter().cloned());
    }

    /// Issues that were acted on in any way (cleaned, failed, or skipped).
    #[must_use]
    pub const fn issues_processed(&self) -> u64 {
        self.issues_cleaned + self.issues_failed + self.issues_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::protocol::SkipReason;

    #[test]
    fn record_routes_every_outcome() {
        let mut stats = CleaningStats::default();
        stats.record(DeletionOutcome::Cleaned(CleanMethod::Normal), "a");
        stats.record(DeletionOutcome::Cleaned(CleanMethod::Forced), "b");
        stats.record(DeletionOutcome::Cleaned(CleanMethod::RebootScheduled), "c");
        stats.record(DeletionOutcome::Skipped(SkipReason::ProtectedAddress), "d");
        stats.record(DeletionOutcome::Failed, "HKLM\\Stuck");

        assert_eq!(stats.issues_cleaned, 3);
        assert_eq!(stats.forced_deletes, 1);
        assert_eq!(stats.scheduled_for_reboot, 1);
        assert_eq!(stats.issues_skipped, 1);
        assert_eq!(stats.issues_failed, 1);
        assert_eq!(stats.failed_items, vec!["HKLM\\Stuck".to_string()]);
        assert_eq!(stats.issues_processed(), 5);
    }

    #[test]
    fn merge_accumulates() {
        let mut total = CleaningStats {
            total_scanned: 10,
            issues_found: 2,
            ..CleaningStats::default()
        };
        let pass = CleaningStats {
            total_scanned: 5,
            issues_found: 1,
            issues_cleaned: 1,
            scan_duration: Duration::from_millis(20),
            failed_items: vec!["x".to_string()],
            ..CleaningStats::default()
        };
        total.merge(&pass);

        assert_eq!(total.total_scanned, 15);
        assert_eq!(total.issues_found, 3);
        assert_eq!(total.issues_cleaned, 1);
        assert_eq!(total.scan_duration, Duration::from_millis(20));
        assert_eq!(total.failed_items, vec!["x".to_string()]);
    }
}
