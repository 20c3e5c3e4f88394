pub mod config;
pub mod directory;
pub mod dry_run;
pub mod error;
pub mod prune;
pub mod query;
pub mod reconcile;
pub mod report;
pub mod summary;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod fake;

pub use error::{PmError, Result};
