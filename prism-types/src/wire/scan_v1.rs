use serde::{Deserialize, Serialize};

use crate::issue::{Issue, IssueCode, IssueDetail, Severity};
use crate::scan::{DatasetScanResult, Inventory, ScanSummary};
use crate::wire::{ToolInfoV1, WireError};
use crate::ToolInfo;

/// Schema-exact wire representation of prism.scan.v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReportV1 {
    pub schema: String,
    pub tool: ToolInfoV1,
    pub dataset: String,
    pub spec_version: String,

    #[serde(default)]
    pub incomplete: bool,

    pub summary: ScanSummary,

    #[serde(default)]
    pub issues: Vec<IssueV1>,

    #[serde(default)]
    pub inventory: Inventory,
}

/// Wire form of an [`Issue`]; codes and severities are plain strings so
/// non-Rust consumers can read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueV1 {
    pub code: String,
    pub severity: String,
    pub message: String,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,

    pub fixable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<IssueDetail>,
}

impl From<&Issue> for IssueV1 {
    fn from(issue: &Issue) -> Self {
        Self {
            code: issue.code.as_str().to_string(),
            severity: issue.severity.as_str().to_string(),
            message: issue.message.clone(),
            paths: issue.affected_paths.iter().map(|p| p.to_string()).collect(),
            fix_hint: issue.fix_hint.clone(),
            fixable: issue.fixable,
            detail: issue.detail.clone(),
        }
    }
}

impl IssueV1 {
    pub fn to_issue(&self, index: usize) -> Result<Issue, WireError> {
        let code: IssueCode = self.code.parse().map_err(|e: crate::issue::UnknownCode| {
            WireError::InvalidIssue {
                index,
                message: e.to_string(),
            }
        })?;
        let severity: Severity =
            self.severity
                .parse()
                .map_err(|e: crate::issue::UnknownSeverity| WireError::InvalidIssue {
                    index,
                    message: e.to_string(),
                })?;
        Ok(Issue {
            code,
            severity,
            message: self.message.clone(),
            affected_paths: self.paths.iter().map(Into::into).collect(),
            fix_hint: self.fix_hint.clone(),
            fixable: self.fixable,
            detail: self.detail.clone(),
        })
    }
}

impl ScanReportV1 {
    pub fn from_result(result: &DatasetScanResult, tool: &ToolInfo) -> Result<Self, WireError> {
        let tool = ToolInfoV1::try_from(tool).map_err(|_| WireError::MissingToolVersion {
            context: "scan",
        })?;
        Ok(Self {
            schema: crate::schema::PRISM_SCAN_V1.to_string(),
            tool,
            dataset: result.dataset_root.to_string(),
            spec_version: result.spec_version.clone(),
            incomplete: result.incomplete,
            summary: result.summary.clone(),
            issues: result.issues.iter().map(IssueV1::from).collect(),
            inventory: result.inventory.clone(),
        })
    }

    /// Parse the issues back into the internal model.
    pub fn issues(&self) -> Result<Vec<Issue>, WireError> {
        if self.schema != crate::schema::PRISM_SCAN_V1 {
            return Err(WireError::SchemaMismatch {
                expected: crate::schema::PRISM_SCAN_V1,
                found: self.schema.clone(),
            });
        }
        self.issues
            .iter()
            .enumerate()
            .map(|(i, issue)| issue.to_issue(i))
            .collect()
    }
}
