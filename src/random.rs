//! Random instance generation over the (variables, clauses) grid.

use crate::formula::{Clause, Formula, Lit};
use rand::prelude::*;

/// Generates a random CNF formula with `num_vars` variables and exactly
/// `num_clauses` clauses.
///
/// Each clause draws a literal count uniformly from `[1, num_vars]` and
/// fills it with distinct variables (redrawing on collision) of random
/// polarity. Afterwards every variable that ended up in no clause is
/// appended to a random clause, so that the instance really exercises
/// all `num_vars` variables. Total for all `num_vars >= 1`,
/// `num_clauses >= 1`.
pub fn generate(num_vars: u32, num_clauses: u32, rng: &mut impl Rng) -> Formula {
    assert!(num_vars >= 1 && num_clauses >= 1);

    let mut clauses = Vec::with_capacity(num_clauses as usize);
    for _ in 0..num_clauses {
        let literal_count = rng.random_range(1..=num_vars);
        let mut clause = Clause::default();
        for _ in 0..literal_count {
            let mut var = rng.random_range(1..=num_vars);
            while clause.contains_var(var) {
                var = rng.random_range(1..=num_vars);
            }
            clause.insert(Lit {
                var,
                positive: rng.random_bool(0.5),
            });
        }
        clauses.push(clause);
    }

    // By chance a variable may occur in no clause at all; such instances
    // would effectively have fewer than `num_vars` variables. Repair by
    // appending each missing variable to a random clause.
    for var in 1..=num_vars {
        if clauses.iter().any(|clause| clause.contains_var(var)) {
            continue;
        }
        let index = rng.random_range(0..clauses.len());
        clauses[index].insert(Lit {
            var,
            positive: rng.random_bool(0.5),
        });
    }

    Formula { num_vars, clauses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_clause_count_and_variable_coverage() {
        let mut rng = rand::rng();
        for (n, m) in [(1, 1), (5, 3), (3, 10), (20, 4)] {
            let formula = generate(n, m, &mut rng);
            assert_eq!(formula.num_vars, n);
            assert_eq!(formula.num_clauses(), m as usize);

            let seen: HashSet<u32> = formula
                .clauses
                .iter()
                .flat_map(|clause| clause.literals.iter().map(|lit| lit.var))
                .collect();
            let expected: HashSet<u32> = (1..=n).collect();
            assert_eq!(seen, expected, "n = {n}, m = {m}");
        }
    }

    #[test]
    fn test_generate_no_duplicate_variables_in_clause() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            let formula = generate(10, 6, &mut rng);
            for clause in &formula.clauses {
                assert!(!clause.is_empty());
                assert!(clause.len() <= 10);
                let vars: HashSet<u32> = clause.literals.iter().map(|lit| lit.var).collect();
                // No duplicate magnitude also rules out complementary pairs.
                assert_eq!(vars.len(), clause.len());
                let sorted: Vec<u32> = clause.literals.iter().map(|lit| lit.var).collect();
                assert!(sorted.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_generate_single_variable_single_clause() {
        let mut rng = rand::rng();
        for _ in 0..10 {
            let formula = generate(1, 1, &mut rng);
            assert_eq!(formula.num_clauses(), 1);
            assert_eq!(formula.clauses[0].len(), 1);
            assert_eq!(formula.clauses[0].literals[0].var, 1);
        }
    }

    #[test]
    fn test_generate_more_variables_than_clauses() {
        // The repair pass must place every leftover variable even when
        // there are few clauses to host them.
        let mut rng = rand::rng();
        let formula = generate(30, 2, &mut rng);
        let seen: HashSet<u32> = formula
            .clauses
            .iter()
            .flat_map(|clause| clause.literals.iter().map(|lit| lit.var))
            .collect();
        assert_eq!(seen.len(), 30);
    }
}
