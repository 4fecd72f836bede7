// Types for CNF instances: literals, clauses, and whole formulas.

use std::fmt;

/// A literal: a variable id in `[1, n]` plus a polarity.
///
/// On the wire (DIMACS) this is a signed integer whose magnitude is the
/// variable id and whose sign is the polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lit {
    pub var: u32,
    pub positive: bool,
}

impl Lit {
    /// The signed DIMACS encoding of this literal.
    pub fn code(self) -> i64 {
        if self.positive {
            i64::from(self.var)
        } else {
            -i64::from(self.var)
        }
    }

    /// Decodes a signed DIMACS literal. Zero is the clause terminator,
    /// not a literal.
    pub fn from_code(code: i64) -> Option<Self> {
        if code == 0 {
            return None;
        }
        Some(Self {
            var: code.unsigned_abs() as u32,
            positive: code > 0,
        })
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A disjunction of literals, at most one per variable, kept sorted by
/// variable id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clause {
    pub literals: Vec<Lit>,
}

impl Clause {
    /// Whether the clause mentions `var` in either polarity.
    pub fn contains_var(&self, var: u32) -> bool {
        self.literals.iter().any(|lit| lit.var == var)
    }

    /// Appends a literal and restores the by-variable ordering.
    pub fn insert(&mut self, lit: Lit) {
        self.literals.push(lit);
        self.literals.sort_by_key(|lit| lit.var);
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

/// A CNF formula over variables `1..=num_vars`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub num_vars: u32,
    pub clauses: Vec<Clause>,
}

impl Formula {
    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }
}
