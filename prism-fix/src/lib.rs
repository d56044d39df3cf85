//! Auto-fix engine.
//!
//! Planning turns fixable issues into [`FixAction`]s without touching disk.
//! Applying merges each payload into current file content and writes only
//! when bytes change, so running plan → apply twice is a no-op the second
//! time.
//!
//! [`FixAction`]: prism_types::fix::FixAction

mod apply;
mod error;
mod lock;
mod planner;

pub use apply::{ApplyOptions, apply, merge_json, merge_tsv, sha256_hex};
pub use error::{FixError, LockError};
pub use lock::{DEFAULT_LOCK_TIMEOUT, DatasetLock, LOCK_FILE};
pub use planner::{FixPlanner, FixPolicy, list_fixable_codes};
