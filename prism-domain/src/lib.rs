//! Domain logic: turn a dataset tree into a deterministic list of issues.
//!
//! This crate owns *what* is wrong with a dataset. It never writes; fixes are
//! the `prism-fix` crate's job.

pub mod grammar;
mod ports;
pub mod sidecar;
mod validator;

pub use grammar::{EntityMatch, ParseError, canonicalize, parse};
pub use ports::{DatasetView, DirEntry, FsDatasetView};
pub use sidecar::{SidecarResolution, SidecarResolver};
pub use validator::{
    CancelToken, DATASET_DESCRIPTION_JSON, PARTICIPANTS_TSV, Validator, parse_participants,
};
