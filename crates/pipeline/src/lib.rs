//! Batch HEVC re-encode pipeline.
//!
//! Walks a library root, filters video files worth re-encoding, estimates
//! the benefit from short probe encodes, runs the full encode for the
//! worthwhile ones, validates and replaces the originals, and records every
//! outcome in per-directory ledgers so reruns are idempotent.

pub mod budget;
pub mod encode;
pub mod estimate;
pub mod filter;
pub mod ledger;
pub mod probe;
pub mod replace;
pub mod run;
pub mod startup;
pub mod task;

pub use hevc_recode_config as config;

pub use budget::TimeBudget;
pub use filter::Candidate;
pub use ledger::{Disposition, Ledger};
pub use run::{dry_run, run_batch, RunError, RunSummary};
pub use startup::run_startup_checks;
pub use task::TaskState;
