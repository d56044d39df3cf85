use serde::{Deserialize, Serialize};

pub mod fix_v1;
pub mod scan_v1;

pub use fix_v1::FixReportV1;
pub use scan_v1::{IssueV1, ScanReportV1};

/// Tool information for wire-level schemas (schema-exact).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfoV1 {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Errors emitted while converting between internal and wire models.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("missing tool version for {context}")]
    MissingToolVersion { context: &'static str },

    #[error("unexpected schema '{found}', expected '{expected}'")]
    SchemaMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("issue {index}: {message}")]
    InvalidIssue { index: usize, message: String },
}

impl TryFrom<&crate::ToolInfo> for ToolInfoV1 {
    type Error = WireError;

    fn try_from(tool: &crate::ToolInfo) -> Result<Self, Self::Error> {
        let version = tool
            .version
            .clone()
            .ok_or(WireError::MissingToolVersion { context: "tool" })?;
        Ok(Self {
            name: tool.name.clone(),
            version,
            commit: tool.commit.clone(),
        })
    }
}
