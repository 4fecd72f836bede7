//! Sequence-number bookkeeping for persisted instances.
//!
//! Instances are bucketed on disk by outcome class (one numeric
//! subdirectory per decomposition width, plus `failed`), and numbered
//! within each class. The tracker hands out the next number per class
//! and can rebuild its counts from an existing output tree so a
//! resumed run never overwrites a prior file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const FAILED_DIR: &str = "failed";
const INSTANCE_EXT: &str = ".cnf";

/// The bucket an instance lands in once its run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    Width(u32),
    Failed,
}

impl OutcomeClass {
    /// Subdirectory name of this class under the instances root.
    pub fn dir_name(self) -> String {
        match self {
            OutcomeClass::Width(width) => width.to_string(),
            OutcomeClass::Failed => FAILED_DIR.to_string(),
        }
    }
}

/// Thread-safe per-class sequence counters.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    counts: Mutex<HashMap<OutcomeClass, u64>>,
}

// A worker that panicked mid-job must not wedge the counters for every
// other worker.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increments the counter for `class` and returns the
    /// new value, the sequence number the caller should persist under.
    pub fn next_sequence(&self, class: OutcomeClass) -> u64 {
        let mut counts = lock(&self.counts);
        let count = counts.entry(class).or_insert(0);
        *count += 1;
        *count
    }

    /// Rebuilds the counters by scanning an existing instances tree,
    /// taking the highest sequence number found per class. Replaces any
    /// current counts; calling it twice on the same tree is idempotent.
    pub fn restore(&self, instances_root: &Path) -> io::Result<()> {
        let mut restored = HashMap::new();
        for entry in fs::read_dir(instances_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let class = if name == FAILED_DIR {
                OutcomeClass::Failed
            } else if let Ok(width) = name.parse() {
                OutcomeClass::Width(width)
            } else {
                continue;
            };
            restored.insert(class, max_sequence(&entry.path())?);
        }
        *lock(&self.counts) = restored;
        Ok(())
    }

    /// A copy of the current counts, for inspection and tests.
    pub fn snapshot(&self) -> HashMap<OutcomeClass, u64> {
        lock(&self.counts).clone()
    }
}

// Instance files are `psw-<width>-order-<seq>.cnf` in width
// subdirectories and `<seq>.cnf` in `failed`; in both cases the
// sequence number is the last `-`-separated piece of the stem.
fn max_sequence(class_dir: &Path) -> io::Result<u64> {
    let mut max = 0;
    for entry in fs::read_dir(class_dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        let Some(stem) = name.strip_suffix(INSTANCE_EXT) else {
            continue;
        };
        if let Some(seq) = stem.rsplit('-').next().and_then(|s| s.parse().ok()) {
            max = std::cmp::max(max, seq);
        }
    }
    Ok(max)
}
