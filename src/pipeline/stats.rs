use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-run counters, one per error/outcome kind from the failure taxonomy.
/// Workers bump these concurrently; nothing here blocks.
#[derive(Debug, Default)]
pub struct RunStats {
    pub files_scanned: AtomicU64,
    pub unreadable_files: AtomicU64,
    pub parse_failures: AtomicU64,
    pub candidates_detected: AtomicU64,
    pub low_confidence_discarded: AtomicU64,
    pub exec_success: AtomicU64,
    pub exec_timeout: AtomicU64,
    pub exec_failure: AtomicU64,
    pub malformed_output: AtomicU64,
    pub validation_passed: AtomicU64,
    pub validation_failed: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub records_written: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn add(counter: &AtomicU64, amount: u64) {
    counter.fetch_add(amount, Ordering::Relaxed);
}

impl RunStats {
    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            unreadable_files: self.unreadable_files.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            candidates_detected: self.candidates_detected.load(Ordering::Relaxed),
            low_confidence_discarded: self.low_confidence_discarded.load(Ordering::Relaxed),
            exec_success: self.exec_success.load(Ordering::Relaxed),
            exec_timeout: self.exec_timeout.load(Ordering::Relaxed),
            exec_failure: self.exec_failure.load(Ordering::Relaxed),
            malformed_output: self.malformed_output.load(Ordering::Relaxed),
            validation_passed: self.validation_passed.load(Ordering::Relaxed),
            validation_failed: self.validation_failed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunStatsSnapshot {
    pub files_scanned: u64,
    pub unreadable_files: u64,
    pub parse_failures: u64,
    pub candidates_detected: u64,
    pub low_confidence_discarded: u64,
    pub exec_success: u64,
    pub exec_timeout: u64,
    pub exec_failure: u64,
    pub malformed_output: u64,
    pub validation_passed: u64,
    pub validation_failed: u64,
    pub duplicates_skipped: u64,
    pub records_written: u64,
}

impl RunStatsSnapshot {
    pub fn validation_pass_rate(&self) -> f64 {
        let total = self.validation_passed + self.validation_failed;
        if total == 0 {
            return 0.0;
        }
        self.validation_passed as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::{RunStats, bump};

    #[test]
    fn snapshot_reflects_bumped_counters() {
        let stats = RunStats::default();
        bump(&stats.files_scanned);
        bump(&stats.files_scanned);
        bump(&stats.validation_passed);
        bump(&stats.validation_failed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.files_scanned, 2);
        assert_eq!(snapshot.validation_passed, 1);
        assert_eq!(snapshot.validation_pass_rate(), 50.0);
    }

    #[test]
    fn pass_rate_with_no_validations_is_zero() {
        let snapshot = RunStats::default().snapshot();
        assert_eq!(snapshot.validation_pass_rate(), 0.0);
    }
}
