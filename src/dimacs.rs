//! Reading and writing DIMACS CNF instance files.
//!
//! Persisted instances carry their run metadata (width, model count,
//! timing, memory) as `c` comment lines; transient instances written
//! only to feed the solver carry none.

use crate::formula::{Clause, Formula, Lit};
use itertools::Itertools;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DimacsError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid DIMACS header: {0:?}")]
    Header(String),
    #[error("invalid literal: {0:?}")]
    Literal(String),
    #[error("clause line without terminating 0: {0:?}")]
    UnterminatedClause(String),
    #[error("expected {expected} clauses, found {found}")]
    ClauseCount { expected: usize, found: usize },
}

/// Writes `formula` to `path` in DIMACS format, with one `c` line per
/// comment after the header.
pub fn write(formula: &Formula, path: &Path, comments: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(
        writer,
        "p cnf {} {}",
        formula.num_vars,
        formula.num_clauses()
    )?;
    for comment in comments {
        writeln!(writer, "c {comment}")?;
    }
    for clause in &formula.clauses {
        writeln!(
            writer,
            "{} 0",
            clause.literals.iter().map(|lit| lit.code()).join(" ")
        )?;
    }
    writer.flush()
}

/// Reads only the `p cnf <n> <m>` header of an instance file.
///
/// This is the entry point of the offline report consumer, which needs
/// the grid coordinates of an instance without re-parsing its clauses.
pub fn read_header(path: &Path) -> Result<(u32, u32), DimacsError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    parse_header(line.trim_end())
}

fn parse_header(line: &str) -> Result<(u32, u32), DimacsError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["p", "cnf", vars, clauses] => {
            let num_vars = vars
                .parse()
                .map_err(|_| DimacsError::Header(line.to_string()))?;
            let num_clauses = clauses
                .parse()
                .map_err(|_| DimacsError::Header(line.to_string()))?;
            Ok((num_vars, num_clauses))
        }
        _ => Err(DimacsError::Header(line.to_string())),
    }
}

/// Parses a whole instance file back into a formula plus its comments.
pub fn read(path: &Path) -> Result<(Formula, Vec<String>), DimacsError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| DimacsError::Header(String::new()))?;
    let (num_vars, expected) = parse_header(header.trim_end())?;

    let mut comments = Vec::new();
    let mut clauses = Vec::new();
    for line in lines {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix("c ") {
            comments.push(comment.to_string());
            continue;
        }
        let mut codes: Vec<i64> = line
            .split_whitespace()
            .map(|token| {
                token
                    .parse()
                    .map_err(|_| DimacsError::Literal(token.to_string()))
            })
            .collect::<Result<_, _>>()?;
        if codes.pop() != Some(0) {
            return Err(DimacsError::UnterminatedClause(line.to_string()));
        }
        let literals = codes
            .into_iter()
            .map(|code| Lit::from_code(code).ok_or_else(|| DimacsError::Literal("0".to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        clauses.push(Clause { literals });
    }

    if clauses.len() != expected as usize {
        return Err(DimacsError::ClauseCount {
            expected: expected as usize,
            found: clauses.len(),
        });
    }
    Ok((Formula { num_vars, clauses }, comments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_header_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("instance.cnf");
        let formula = random::generate(7, 4, &mut rand::rng());
        write(&formula, &path, &[]).unwrap();
        assert_eq!(read_header(&path).unwrap(), (7, 4));
    }

    #[test]
    fn test_write_read_roundtrip_with_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("instance.cnf");
        let formula = random::generate(9, 6, &mut rand::rng());
        let comments = vec![
            "ps-width: 12".to_string(),
            "models: 42".to_string(),
            "time: 0:00:01.500000".to_string(),
        ];
        write(&formula, &path, &comments).unwrap();

        let (parsed, parsed_comments) = read(&path).unwrap();
        assert_eq!(parsed_comments, comments);
        assert_eq!(parsed.num_vars, formula.num_vars);
        assert_eq!(parsed.num_clauses(), formula.num_clauses());
        for (left, right) in parsed.clauses.iter().zip(&formula.clauses) {
            let left: HashSet<_> = left.literals.iter().copied().collect();
            let right: HashSet<_> = right.literals.iter().copied().collect();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_read_rejects_bad_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.cnf");
        std::fs::write(&path, "p dnf 3 1\n1 2 0\n").unwrap();
        assert!(matches!(read(&path), Err(DimacsError::Header(_))));
    }

    #[test]
    fn test_read_rejects_clause_count_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.cnf");
        std::fs::write(&path, "p cnf 3 2\n1 -2 0\n").unwrap();
        assert!(matches!(
            read(&path),
            Err(DimacsError::ClauseCount {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_read_rejects_unterminated_clause() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unterminated.cnf");
        std::fs::write(&path, "p cnf 3 1\n1 -2\n").unwrap();
        assert!(matches!(
            read(&path),
            Err(DimacsError::UnterminatedClause(_))
        ));
    }
}
