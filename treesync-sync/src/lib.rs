//! # treesync-sync
//!
//! Exclusion matching, inventory, planning and execution of a one-way mirror.
//!
//! Call [`pipeline::run`] to mirror a source tree onto a target tree, or use
//! [`copy_single_file`] / [`delete_single_path`] to apply one change.

pub mod error;
pub mod exclusion;
pub mod executor;
pub mod inventory;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod writer;

pub use error::SyncError;
pub use exclusion::{read_ignore_file, ExclusionSet, IGNORE_FILE_NAME};
pub use executor::{execute, SyncOutcome};
pub use inventory::{build_inventory, Inventory};
pub use pipeline::{preview, validate_roots, SyncRequest};
pub use planner::{plan, SyncPlan};
pub use report::{CancelFlag, NullReporter, SyncReporter, TracingReporter};
pub use writer::{copy_single_file, delete_single_path, CopyResult, DeleteResult};
