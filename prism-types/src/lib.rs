//! Shared DTOs (schemas-as-code) for the prism workspace.
//!
//! # Design constraints
//! - These types are intended to be serialized to disk and consumed by CI.
//! - Issue codes keep a fixed severity/fixable pairing; never change a pairing
//!   outside a major version.
//! - Prefer adding optional fields over changing semantics.

pub mod fix;
pub mod issue;
pub mod scan;
pub mod wire;

use serde::{Deserialize, Serialize};

/// Schema identifiers.
pub mod schema {
    pub const PRISM_SCAN_V1: &str = "prism.scan.v1";
    pub const PRISM_FIX_V1: &str = "prism.fix.v1";
}

/// Identity of the tool that produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl ToolInfo {
    pub fn prism(version: &str) -> Self {
        Self {
            name: "prism".to_string(),
            version: Some(version.to_string()),
            commit: None,
        }
    }
}
