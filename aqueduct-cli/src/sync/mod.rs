//! Reconciliation engine
//!
//! Walks the component graph on the source instance and reproduces it on the
//! destination: matching records by a cross-instance identity, rewriting
//! embedded references to destination ids, and creating or updating only what
//! differs.

pub mod components;
pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod remap;
pub mod report;
pub mod scrub;
pub mod state;

#[cfg(test)]
pub mod testing;

pub use engine::Migration;
pub use report::{RunReport, format_diff_log, format_homework};
pub use state::{Filters, RunOptions};
