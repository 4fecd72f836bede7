//! Thread-safe accumulation of run outcomes per (n, m) row.
//!
//! A row is flushed to its report file and evicted from memory the
//! moment its last outcome arrives, inside the same critical section,
//! so memory stays bounded regardless of grid size and no row can be
//! flushed twice.

use crate::report;
use crate::solver::RunOutcome;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

pub struct ResultAggregator {
    reports_dir: PathBuf,
    runs_per_pair: usize,
    rows: Mutex<HashMap<(u32, u32), Vec<RunOutcome>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResultAggregator {
    pub fn new(reports_dir: impl Into<PathBuf>, runs_per_pair: usize) -> Self {
        assert!(runs_per_pair >= 1);
        Self {
            reports_dir: reports_dir.into(),
            runs_per_pair,
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Appends one outcome to the (n, m) row. When the row reaches the
    /// repetition target it is written to `report-<n>.txt` and dropped
    /// from memory; returns whether that happened.
    ///
    /// Safe to call concurrently from any number of workers, including
    /// for the same (n, m).
    pub fn record(
        &self,
        num_vars: u32,
        num_clauses: u32,
        outcome: RunOutcome,
    ) -> io::Result<bool> {
        let mut rows = lock(&self.rows);
        let row = rows.entry((num_vars, num_clauses)).or_default();
        row.push(outcome);
        if row.len() < self.runs_per_pair {
            return Ok(false);
        }
        let outcomes = std::mem::take(row);
        rows.remove(&(num_vars, num_clauses));
        report::write_row(&self.reports_dir, num_vars, num_clauses, &outcomes)?;
        Ok(true)
    }

    /// Number of rows still waiting for outcomes. Complete rows are
    /// flushed eagerly, so after a full drain this is zero; after an
    /// interruption it counts the rows whose remaining runs were
    /// abandoned.
    pub fn pending_rows(&self) -> usize {
        lock(&self.rows).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{parse_file, report_path};
    use std::time::Duration;
    use tempfile::tempdir;

    fn success(models: u64) -> RunOutcome {
        RunOutcome::Success {
            width: 4,
            elapsed: Duration::from_secs(1),
            models,
            peak_memory: None,
        }
    }

    #[test]
    fn test_row_flushes_once_complete() {
        let dir = tempdir().unwrap();
        let aggregator = ResultAggregator::new(dir.path(), 3);

        assert!(!aggregator.record(2, 1, success(1)).unwrap());
        assert!(!aggregator.record(2, 1, success(2)).unwrap());
        assert_eq!(aggregator.pending_rows(), 1);
        assert!(aggregator.record(2, 1, success(3)).unwrap());
        assert_eq!(aggregator.pending_rows(), 0);

        let rows = parse_file(&report_path(dir.path(), 2)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcomes.len(), 3);
    }

    #[test]
    fn test_rows_are_independent() {
        let dir = tempdir().unwrap();
        let aggregator = ResultAggregator::new(dir.path(), 2);

        aggregator.record(2, 1, success(1)).unwrap();
        aggregator.record(2, 2, success(2)).unwrap();
        aggregator.record(3, 1, success(3)).unwrap();
        assert_eq!(aggregator.pending_rows(), 3);

        assert!(aggregator.record(2, 2, success(4)).unwrap());
        assert_eq!(aggregator.pending_rows(), 2);
        // Only the completed row reached the report.
        let rows = parse_file(&report_path(dir.path(), 2)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].num_clauses, 2);
    }
}
