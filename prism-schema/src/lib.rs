//! Versioned schema registry.
//!
//! A [`SchemaRegistry`] owns every [`SpecVersion`] loaded during a run. Versions
//! are immutable once loaded and shared through `Arc`, so the validator and the
//! fix planner read the same compiled schemas without locking after load.

mod compiled;
mod error;
mod registry;

pub use compiled::{CompiledSchema, Violation, placeholder_for};
pub use error::ConfigurationError;
pub use registry::{DATASET_DESCRIPTION, STABLE_ALIAS, SchemaRegistry, SpecVersion};
