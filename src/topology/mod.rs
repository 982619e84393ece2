/*!
Topology module

Structure:
- `enabler`: turns LLDP on for every interface of a router.
- `collector`: gathers adjacency observations and suppresses duplicates across the run.
- `run`: the per-router loop, its failure policy and the end-to-end `execute` entry point.
*/

pub mod collector;
pub mod enabler;
pub mod run;

#[cfg(test)]
pub(crate) mod testing;

pub use run::{FailurePolicy, RunOptions, execute};
