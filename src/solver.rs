//! Invocation of the external model counter and parsing of its console
//! output.
//!
//! The solver is an opaque binary, trusted only through its output
//! contract: on success it reports the decomposition ps-width, the
//! elapsed time and optionally memory samples on tagged stdout lines,
//! and prints the model count as the final (untagged) line; on failure
//! it exits non-zero with the diagnostic on stderr.

use std::path::Path;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

const WIDTH_TAG: &str = "ps-width of the decomposition is";
const ELAPSED_TAG: &str = "[psw] Time elapsed:";
const MEMORY_TAG: &str = "[psw] Memory usage:";
const FAILURE_RUNTIME_TAG: &str = "Total runtime:";
const VERBOSE_FLAG: &str = "--verbose";

// The solver's console logger wraps each line in an ANSI color
// sequence: a 5-byte `ESC [ 3 <x> m` prefix and the 4-byte `ESC [ 0 m`
// reset. Tag matching happens on the de-framed line. The model-count
// line is printed outside the logger and is never framed.
const FRAME_PREFIX_LEN: usize = 5;
const FRAME_SUFFIX_LEN: usize = 4;

/// Result of one solver invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success {
        width: u32,
        elapsed: Duration,
        models: u64,
        /// Peak memory in GiB; `None` when the solver build lacks
        /// memory instrumentation.
        peak_memory: Option<f64>,
    },
    Failure {
        message: String,
        elapsed: Option<Duration>,
        width: Option<u32>,
        peak_memory: Option<f64>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            RunOutcome::Success { elapsed, .. } => Some(*elapsed),
            RunOutcome::Failure { elapsed, .. } => *elapsed,
        }
    }

    pub fn width(&self) -> Option<u32> {
        match self {
            RunOutcome::Success { width, .. } => Some(*width),
            RunOutcome::Failure { width, .. } => *width,
        }
    }

    pub fn models(&self) -> Option<u64> {
        match self {
            RunOutcome::Success { models, .. } => Some(*models),
            RunOutcome::Failure { .. } => None,
        }
    }

    pub fn peak_memory(&self) -> Option<f64> {
        match self {
            RunOutcome::Success { peak_memory, .. } | RunOutcome::Failure { peak_memory, .. } => {
                *peak_memory
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RunOutcome::Success { .. } => None,
            RunOutcome::Failure { message, .. } => Some(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("failed to run solver: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("solver output missing `{0}` line")]
    MissingTag(&'static str),
    #[error("solver output has no model count line")]
    MissingModelCount,
    #[error("malformed solver output: {0:?}")]
    Malformed(String),
}

/// Runs the solver on an instance file, blocking until it exits.
///
/// A non-zero exit status is a `Failure` outcome, not an error; `Err`
/// means the process could not be run or its output violated the
/// protocol above.
pub fn run(solver: &Path, instance: &Path) -> Result<RunOutcome, SolverError> {
    let output = Command::new(solver)
        .arg(instance)
        .arg(VERBOSE_FLAG)
        .output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_output(output.status.success(), &stdout, &stderr)
}

/// Classifies a finished invocation from its exit status and captured
/// streams. Separated from [`run`] so the protocol is testable without
/// a solver binary.
pub fn parse_output(
    exit_ok: bool,
    stdout: &str,
    stderr: &str,
) -> Result<RunOutcome, SolverError> {
    let mut width = None;
    let mut elapsed = None;
    let mut failure_elapsed = None;
    let mut peak_memory: Option<f64> = None;

    for line in stdout.lines() {
        let line = strip_decoration(line);
        if let Some(rest) = line.strip_prefix(WIDTH_TAG) {
            width = rest.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix(ELAPSED_TAG) {
            elapsed = parse_duration(rest.trim()).ok();
        } else if let Some(rest) = line.strip_prefix(FAILURE_RUNTIME_TAG) {
            failure_elapsed = parse_duration(rest.trim()).ok();
        } else if let Some(rest) = line.strip_prefix(MEMORY_TAG) {
            // Possibly many samples per run; keep the running maximum.
            if let Some(sample) = rest
                .split_whitespace()
                .next()
                .and_then(|value| value.parse::<f64>().ok())
            {
                peak_memory = Some(peak_memory.map_or(sample, |peak| peak.max(sample)));
            }
        }
    }

    if !exit_ok {
        let message = stderr
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .unwrap_or("solver exited abnormally")
            .to_string();
        return Ok(RunOutcome::Failure {
            message,
            elapsed: failure_elapsed,
            width,
            peak_memory,
        });
    }

    let width = width.ok_or(SolverError::MissingTag(WIDTH_TAG))?;
    let elapsed = elapsed.ok_or(SolverError::MissingTag(ELAPSED_TAG))?;
    let models = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or(SolverError::MissingModelCount)?
        .trim()
        .parse()
        .map_err(|_| SolverError::MissingModelCount)?;

    Ok(RunOutcome::Success {
        width,
        elapsed,
        models,
        peak_memory,
    })
}

/// Strips the solver logger's ANSI color framing, if present.
pub fn strip_decoration(line: &str) -> &str {
    if line.len() >= FRAME_PREFIX_LEN + FRAME_SUFFIX_LEN
        && line.starts_with('\u{1b}')
        && line.ends_with('m')
        && line.is_char_boundary(FRAME_PREFIX_LEN)
        && line.is_char_boundary(line.len() - FRAME_SUFFIX_LEN)
    {
        &line[FRAME_PREFIX_LEN..line.len() - FRAME_SUFFIX_LEN]
    } else {
        line
    }
}

/// Parses a `H:MM:SS.ffffff` duration string by summing
/// `3600 * H + 60 * M + S`, with microsecond precision.
pub fn parse_duration(text: &str) -> Result<Duration, SolverError> {
    let malformed = || SolverError::Malformed(text.to_string());
    let mut parts = text.split(':');
    let (Some(hours), Some(minutes), Some(seconds), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let hours: u64 = hours.parse().map_err(|_| malformed())?;
    let minutes: u64 = minutes.parse().map_err(|_| malformed())?;
    let (whole, micros) = match seconds.split_once('.') {
        Some((whole, frac)) => {
            let mut digits: String = frac.chars().take(6).collect();
            if !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(malformed());
            }
            while digits.len() < 6 {
                digits.push('0');
            }
            (whole, digits.parse::<u32>().map_err(|_| malformed())?)
        }
        None => (seconds, 0),
    };
    let whole: u64 = whole.parse().map_err(|_| malformed())?;
    Ok(Duration::new(
        hours * 3600 + minutes * 60 + whole,
        micros * 1000,
    ))
}

/// Formats a duration as `H:MM:SS.ffffff`, the exact inverse of
/// [`parse_duration`].
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        secs % 3600 / 60,
        secs % 60,
        duration.subsec_micros()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(line: &str) -> String {
        format!("\u{1b}[33m{line}\u{1b}[0m")
    }

    #[test]
    fn test_strip_decoration() {
        assert_eq!(
            strip_decoration("\u{1b}[33mps-width of the decomposition is 4\u{1b}[0m"),
            "ps-width of the decomposition is 4"
        );
        // Undecorated lines pass through untouched.
        assert_eq!(strip_decoration("1234"), "1234");
        assert_eq!(strip_decoration(""), "");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration("0:00:01.500000").unwrap(),
            Duration::from_micros(1_500_000)
        );
        assert_eq!(
            parse_duration("1:02:03").unwrap(),
            Duration::from_secs(3723)
        );
        assert!(parse_duration("59.5").is_err());
        assert!(parse_duration("0:xx:01").is_err());
    }

    #[test]
    fn test_format_duration_roundtrip() {
        for micros in [0, 1_500_000, 59_999_999, 3_600_000_001] {
            let duration = Duration::from_micros(micros);
            assert_eq!(parse_duration(&format_duration(duration)).unwrap(), duration);
        }
        assert_eq!(format_duration(Duration::from_micros(1_500_000)), "0:00:01.500000");
    }

    #[test]
    fn test_parse_success_output() {
        let stdout = [
            framed("[psw] Time elapsed: 0:00:01.500000"),
            framed("[psw] Memory usage: 1.2 GiB"),
            framed("[psw] Memory usage: 0.8 GiB"),
            framed("ps-width of the decomposition is 4"),
            "7".to_string(),
        ]
        .join("\n");
        let outcome = parse_output(true, &stdout, "").unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Success {
                width: 4,
                elapsed: Duration::from_micros(1_500_000),
                models: 7,
                peak_memory: Some(1.2),
            }
        );
    }

    #[test]
    fn test_parse_success_without_memory_instrumentation() {
        let stdout = [
            framed("ps-width of the decomposition is 11"),
            framed("[psw] Time elapsed: 0:00:00.250000"),
            "1024".to_string(),
        ]
        .join("\n");
        let outcome = parse_output(true, &stdout, "").unwrap();
        assert_eq!(outcome.peak_memory(), None);
        assert_eq!(outcome.models(), Some(1024));
    }

    #[test]
    fn test_parse_failure_with_bare_stderr() {
        let outcome = parse_output(false, "", "out of memory").unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Failure {
                message: "out of memory".to_string(),
                elapsed: None,
                width: None,
                peak_memory: None,
            }
        );
    }

    #[test]
    fn test_parse_failure_recovers_runtime() {
        let stdout = framed("Total runtime: 0:00:12.000000");
        let outcome = parse_output(false, &stdout, "timeout\nmore detail").unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Failure {
                message: "timeout".to_string(),
                elapsed: Some(Duration::from_secs(12)),
                width: None,
                peak_memory: None,
            }
        );
    }

    #[test]
    fn test_parse_success_missing_width_is_protocol_error() {
        let stdout = [framed("[psw] Time elapsed: 0:00:01.000000"), "7".to_string()].join("\n");
        assert!(matches!(
            parse_output(true, &stdout, ""),
            Err(SolverError::MissingTag(tag)) if tag == WIDTH_TAG
        ));
    }

    #[test]
    fn test_parse_success_missing_model_count_is_protocol_error() {
        let stdout = [
            framed("ps-width of the decomposition is 4"),
            framed("[psw] Time elapsed: 0:00:01.000000"),
        ]
        .join("\n");
        assert!(matches!(
            parse_output(true, &stdout, ""),
            Err(SolverError::MissingModelCount)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_against_stub_solver() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("solver.sh");
        std::fs::write(
            &script,
            concat!(
                "#!/bin/sh\n",
                "printf '\\033[33mps-width of the decomposition is 4\\033[0m\\n'\n",
                "printf '\\033[33m[psw] Time elapsed: 0:00:01.500000\\033[0m\\n'\n",
                "printf '\\033[33m[psw] Memory usage: 1.2 GiB\\033[0m\\n'\n",
                "echo 7\n",
            ),
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let instance = dir.path().join("instance.cnf");
        std::fs::write(&instance, "p cnf 1 1\n1 0\n").unwrap();

        let outcome = run(&script, &instance).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Success {
                width: 4,
                elapsed: Duration::from_micros(1_500_000),
                models: 7,
                peak_memory: Some(1.2),
            }
        );
    }
}
