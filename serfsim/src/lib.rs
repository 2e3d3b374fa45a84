//! Command-line front end for the serf simulation.
//!
//! - [`demo`]: a seeded starter colony to run when no save is given
//! - [`report`]: one-line tick summaries and the end-of-run statistics

pub mod demo;
pub mod report;
