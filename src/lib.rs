//! Benchmark harness for the hexmc model counter.
//!
//! Generates random CNF instances over an (n variables, m clauses)
//! grid, runs the external solver on each of them concurrently,
//! buckets the persisted instances by reported ps-width, and condenses
//! the per-(n, m) results into text reports an offline consumer can
//! parse back losslessly.

pub mod aggregate;
pub mod dimacs;
pub mod formula;
pub mod pipeline;
pub mod progress;
pub mod random;
pub mod report;
pub mod scheduler;
pub mod solver;
