//! Third-party validators.
//!
//! Plugins run after the native pass and see the scan result read-only. They
//! must not modify the dataset. Whatever a plugin does wrong (returns an
//! error, panics, times out, prints garbage) is contained: it costs exactly
//! one PRISM901 issue and the remaining plugins still run.

mod command;
mod manifest;
mod plugin;
mod registry;

pub use command::CommandPlugin;
pub use manifest::{DiscoveredPlugin, PluginLoadError, PluginManifest, discover_manifests};
pub use plugin::{FnPlugin, Plugin, PluginContext, PluginFinding, parse_findings};
pub use registry::PluginRegistry;
