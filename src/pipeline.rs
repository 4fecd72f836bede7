//! The per-job pipeline and the on-disk layout it writes into.
//!
//! Layout under the output root:
//!
//! ```text
//! <root>/temp/                  scratch: transient instances fed to the solver
//! <root>/instances/<width>/     persisted instances, bucketed by ps-width
//! <root>/instances/failed/      archived instances whose run failed
//! <root>/reports/report-<n>.txt condensed per-row statistics
//! ```

use crate::aggregate::ResultAggregator;
use crate::dimacs;
use crate::progress::{OutcomeClass, ProgressTracker, FAILED_DIR};
use crate::random;
use crate::scheduler::Job;
use crate::solver::{self, format_duration, RunOutcome};
use log::{error, info, warn};
use std::fs;
use std::io;
use std::path::PathBuf;

/// The output directory layout. Creation is idempotent; an existing
/// tree (from a run being resumed) is left untouched.
#[derive(Debug, Clone)]
pub struct Dirs {
    pub root: PathBuf,
    pub temp: PathBuf,
    pub instances: PathBuf,
    pub failed: PathBuf,
    pub reports: PathBuf,
}

impl Dirs {
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let dirs = Self {
            temp: root.join("temp"),
            instances: root.join("instances"),
            failed: root.join("instances").join(FAILED_DIR),
            reports: root.join("reports"),
            root,
        };
        for dir in [&dirs.temp, &dirs.failed, &dirs.reports] {
            fs::create_dir_all(dir)?;
        }
        Ok(dirs)
    }
}

/// Everything one job needs: the layout, the solver, and the two
/// shared-state objects. All workers share one `Pipeline`.
pub struct Pipeline {
    dirs: Dirs,
    solver_path: PathBuf,
    pub progress: ProgressTracker,
    pub aggregator: ResultAggregator,
}

impl Pipeline {
    pub fn new(dirs: Dirs, solver_path: PathBuf, runs_per_pair: usize) -> Self {
        let aggregator = ResultAggregator::new(dirs.reports.clone(), runs_per_pair);
        Self {
            dirs,
            solver_path,
            progress: ProgressTracker::new(),
            aggregator,
        }
    }

    /// Runs one grid cell end to end: generate, hand to the solver,
    /// persist, record. Never fatal to the scheduler; whatever goes
    /// wrong is logged here with the cell's coordinates.
    pub fn run_job(&self, job: Job) {
        if let Err(err) = self.try_run_job(job) {
            error!(
                "n = {}, m = {}, i = {}: {err}",
                job.num_vars, job.num_clauses, job.run_index
            );
        }
    }

    fn try_run_job(&self, job: Job) -> io::Result<()> {
        let Job {
            num_vars: n,
            num_clauses: m,
            run_index: i,
        } = job;

        let formula = random::generate(n, m, &mut rand::rng());
        let temp_file = self.dirs.temp.join(format!("temp-{n}-{m}-{i}.cnf"));
        dimacs::write(&formula, &temp_file, &[])?;

        // A non-zero exit is a classified failure; a spawn or protocol
        // error is counted and archived the same way, with the error
        // text as the diagnostic.
        let outcome = match solver::run(&self.solver_path, &temp_file) {
            Ok(outcome) => outcome,
            Err(err) => RunOutcome::Failure {
                message: err.to_string(),
                elapsed: None,
                width: None,
                peak_memory: None,
            },
        };

        match &outcome {
            RunOutcome::Success {
                width,
                elapsed,
                models,
                peak_memory,
            } => {
                let sequence = self.progress.next_sequence(OutcomeClass::Width(*width));
                let class_dir = self.dirs.instances.join(OutcomeClass::Width(*width).dir_name());
                // Another worker may create the directory between the
                // check and our attempt; create_dir_all treats that as
                // success.
                fs::create_dir_all(&class_dir)?;
                let mut comments = vec![
                    format!("ps-width: {width}"),
                    format!("models: {models}"),
                    format!("time: {}", format_duration(*elapsed)),
                ];
                if let Some(gib) = peak_memory {
                    comments.push(format!("peak memory usage: {gib} GiB"));
                }
                let file = class_dir.join(format!("psw-{width}-order-{sequence}.cnf"));
                dimacs::write(&formula, &file, &comments)?;
                info!(
                    "n = {n}, m = {m}, i = {i}: decomposition had ps-width {width}, \
                     elapsed time was {}",
                    format_duration(*elapsed)
                );
            }
            RunOutcome::Failure {
                message, elapsed, ..
            } => {
                let sequence = self.progress.next_sequence(OutcomeClass::Failed);
                let mut comments =
                    vec!["solver reported error:".to_string(), message.clone()];
                if let Some(elapsed) = elapsed {
                    comments.push(format!("runtime: {}", format_duration(*elapsed)));
                }
                let file = self.dirs.failed.join(format!("{sequence}.cnf"));
                dimacs::write(&formula, &file, &comments)?;
                warn!("n = {n}, m = {m}, i = {i}: solver reported error: {message}");
            }
        }

        if self.aggregator.record(n, m, outcome)? {
            info!("n = {n}, m = {m}: processed all runs");
        }

        fs::remove_file(&temp_file)?;
        Ok(())
    }

    /// Removes the scratch directory if nothing was left behind in it.
    pub fn remove_temp_dir(&self) {
        if fs::remove_dir(&self.dirs.temp).is_err() {
            warn!(
                "leaving scratch directory {} behind (not empty)",
                self.dirs.temp.display()
            );
        }
    }
}
