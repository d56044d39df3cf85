//! Embeddable core library for prism.
//!
//! Provides a clap-free entry point suitable for linking into a host
//! process. Artifact writes go through the [`ports::WritePort`] trait; the
//! [`adapters`] module provides the filesystem-backed default.
//!
//! # Entry points
//!
//! - [`run_validate`](pipeline::run_validate) scans a dataset
//! - [`run_fix`](pipeline::run_fix) scans, plans and applies fixes

pub mod adapters;
pub mod pipeline;
pub mod ports;
pub mod settings;

pub use pipeline::{FixOutcome, RunError, run_fix, run_validate};
pub use settings::{ExternalSettings, FixSettings, ValidateSettings};

// Re-exported so embedders don't need the inner crates directly.
pub use prism_domain::CancelToken;
pub use prism_plugins::{Plugin, PluginContext, PluginFinding, PluginRegistry};
pub use prism_schema::{ConfigurationError, SchemaRegistry};
