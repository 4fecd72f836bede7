//! The per-(n, m) report block format: writer and its exact-inverse
//! parser.
//!
//! Each completed row of the grid is appended to `report-<n>.txt` as
//! one block:
//!
//! ```text
//! n 3 m 2 (2 runs)
//! runtime: 0:00:01.500000 unknown
//! decomposition ps-width: 4 unknown
//! models: 7 unknown
//! peak memory: 1.2 unknown
//! errors:
//! 	run 2: timeout
//!
//! ```
//!
//! Absent values are the `unknown` sentinel, the `errors:` sub-block is
//! present only if at least one run failed, and a blank line terminates
//! every block. The parser reconstructs the original outcomes: a run is
//! a failure exactly when it has an `errors:` entry.

use crate::solver::{format_duration, parse_duration, RunOutcome};
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const UNKNOWN: &str = "unknown";
const RUNTIME_PREFIX: &str = "runtime:";
const WIDTH_PREFIX: &str = "decomposition ps-width:";
const MODELS_PREFIX: &str = "models:";
const MEMORY_PREFIX: &str = "peak memory:";
const ERRORS_HEADER: &str = "errors:";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed block header: {0:?}")]
    Header(String),
    #[error("expected `{expected}` line, found {found:?}")]
    ExpectedLine {
        expected: &'static str,
        found: String,
    },
    #[error("malformed value {0:?}")]
    Value(String),
    #[error("block n {n} m {m}: expected {expected} values, found {found}")]
    ValueCount {
        n: u32,
        m: u32,
        expected: usize,
        found: usize,
    },
    #[error("malformed error line: {0:?}")]
    ErrorLine(String),
    #[error("block n {n} m {m}, run {run}: successful run missing {field}")]
    MissingField {
        n: u32,
        m: u32,
        run: usize,
        field: &'static str,
    },
}

/// One parsed report block.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub num_vars: u32,
    pub num_clauses: u32,
    pub outcomes: Vec<RunOutcome>,
}

/// Path of the report file holding all rows for a given n.
pub fn report_path(reports_dir: &Path, num_vars: u32) -> PathBuf {
    reports_dir.join(format!("report-{num_vars}.txt"))
}

fn or_unknown<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |value| value.to_string())
}

/// Appends one completed row as a block to `report-<n>.txt`.
pub fn write_row(
    reports_dir: &Path,
    num_vars: u32,
    num_clauses: u32,
    outcomes: &[RunOutcome],
) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(report_path(reports_dir, num_vars))?;

    writeln!(
        file,
        "n {num_vars} m {num_clauses} ({} runs)",
        outcomes.len()
    )?;
    writeln!(
        file,
        "{RUNTIME_PREFIX} {}",
        outcomes
            .iter()
            .map(|outcome| or_unknown(outcome.elapsed().map(format_duration)))
            .join(" ")
    )?;
    writeln!(
        file,
        "{WIDTH_PREFIX} {}",
        outcomes
            .iter()
            .map(|outcome| or_unknown(outcome.width()))
            .join(" ")
    )?;
    writeln!(
        file,
        "{MODELS_PREFIX} {}",
        outcomes
            .iter()
            .map(|outcome| or_unknown(outcome.models()))
            .join(" ")
    )?;
    writeln!(
        file,
        "{MEMORY_PREFIX} {}",
        outcomes
            .iter()
            .map(|outcome| or_unknown(outcome.peak_memory()))
            .join(" ")
    )?;
    if outcomes.iter().any(|outcome| !outcome.is_success()) {
        writeln!(file, "{ERRORS_HEADER}")?;
        for (index, outcome) in outcomes.iter().enumerate() {
            if let Some(message) = outcome.error_message() {
                writeln!(file, "\trun {}: {message}", index + 1)?;
            }
        }
    }
    writeln!(file)
}

/// Lazily parses every `report-<n>.txt` in a directory, in file-name
/// order. Used by the offline analysis consumer.
pub fn parse_reports(
    reports_dir: &Path,
) -> Result<impl Iterator<Item = Result<RowRecord, ReportError>>, ReportError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(reports_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("report-") && name.ends_with(".txt"))
        })
        .collect();
    paths.sort();

    Ok(paths.into_iter().flat_map(|path| match parse_file(&path) {
        Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
        Err(err) => vec![Err(err)],
    }))
}

/// Parses all blocks of a single report file.
pub fn parse_file(path: &Path) -> Result<Vec<RowRecord>, ReportError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines().peekable();
    let mut rows = Vec::new();

    loop {
        // Skip the blank block terminators between (and after) blocks.
        let header = loop {
            match lines.next().transpose()? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
                None => return Ok(rows),
            }
        };
        rows.push(parse_block(&header, &mut lines)?);
    }
}

fn parse_block(
    header: &str,
    lines: &mut std::iter::Peekable<impl Iterator<Item = io::Result<String>>>,
) -> Result<RowRecord, ReportError> {
    let bad_header = || ReportError::Header(header.to_string());
    let tokens: Vec<&str> = header.split_whitespace().collect();
    let (num_vars, num_clauses, runs): (u32, u32, usize) = match tokens.as_slice() {
        ["n", n, "m", m, k, "runs)"] => {
            let k = k.strip_prefix('(').ok_or_else(bad_header)?;
            (
                n.parse().map_err(|_| bad_header())?,
                m.parse().map_err(|_| bad_header())?,
                k.parse().map_err(|_| bad_header())?,
            )
        }
        _ => return Err(bad_header()),
    };

    let runtimes = values_line(lines, RUNTIME_PREFIX)?;
    let widths = values_line(lines, WIDTH_PREFIX)?;
    let models = values_line(lines, MODELS_PREFIX)?;
    let memories = values_line(lines, MEMORY_PREFIX)?;
    for values in [&runtimes, &widths, &models, &memories] {
        if values.len() != runs {
            return Err(ReportError::ValueCount {
                n: num_vars,
                m: num_clauses,
                expected: runs,
                found: values.len(),
            });
        }
    }

    let mut errors: HashMap<usize, String> = HashMap::new();
    if lines
        .peek()
        .and_then(|line| line.as_ref().ok())
        .is_some_and(|line| line.trim_end() == ERRORS_HEADER)
    {
        lines.next().transpose()?;
        while let Some(Ok(line)) = lines.peek() {
            let Some(entry) = line.strip_prefix('\t') else {
                break;
            };
            let entry = entry.to_string();
            lines.next().transpose()?;
            let rest = entry
                .strip_prefix("run ")
                .ok_or_else(|| ReportError::ErrorLine(entry.clone()))?;
            let (index, message) = rest
                .split_once(':')
                .ok_or_else(|| ReportError::ErrorLine(entry.clone()))?;
            let index: usize = index
                .parse()
                .map_err(|_| ReportError::ErrorLine(entry.clone()))?;
            errors.insert(index, message.strip_prefix(' ').unwrap_or(message).to_string());
        }
    }

    let mut outcomes = Vec::with_capacity(runs);
    for run in 1..=runs {
        let elapsed = known(&runtimes[run - 1], |text| parse_duration(text).ok())?;
        let width = known(&widths[run - 1], |text| text.parse().ok())?;
        let model_count = known(&models[run - 1], |text| text.parse().ok())?;
        let peak_memory = known(&memories[run - 1], |text| text.parse().ok())?;

        let missing = |field| ReportError::MissingField {
            n: num_vars,
            m: num_clauses,
            run,
            field,
        };
        let outcome = match errors.remove(&run) {
            Some(message) => RunOutcome::Failure {
                message,
                elapsed,
                width,
                peak_memory,
            },
            None => RunOutcome::Success {
                width: width.ok_or_else(|| missing("ps-width"))?,
                elapsed: elapsed.ok_or_else(|| missing("runtime"))?,
                models: model_count.ok_or_else(|| missing("model count"))?,
                peak_memory,
            },
        };
        outcomes.push(outcome);
    }

    Ok(RowRecord {
        num_vars,
        num_clauses,
        outcomes,
    })
}

fn values_line(
    lines: &mut impl Iterator<Item = io::Result<String>>,
    prefix: &'static str,
) -> Result<Vec<String>, ReportError> {
    let line = lines.next().transpose()?.unwrap_or_default();
    let rest = line
        .strip_prefix(prefix)
        .ok_or_else(|| ReportError::ExpectedLine {
            expected: prefix,
            found: line.clone(),
        })?;
    Ok(rest.split_whitespace().map(str::to_string).collect())
}

/// Maps the `unknown` sentinel to `None` and anything else through
/// `parse`, rejecting values `parse` cannot handle.
fn known<T>(text: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>, ReportError> {
    if text == UNKNOWN {
        return Ok(None);
    }
    parse(text)
        .map(Some)
        .ok_or_else(|| ReportError::Value(text.to_string()))
}
