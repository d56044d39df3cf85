//! Out-of-process collaborators.
//!
//! [`process`] runs one command with a deadline; [`bids`] drives an external
//! standards validator through it and maps its findings onto PRISM5xx codes.

pub mod bids;
pub mod process;

pub use bids::{DEFAULT_COMMAND, ExternalValidator, translate_report};
pub use process::{CommandOutput, CommandSpec, ExternalError, run};
