use serde::{Deserialize, Serialize};

use crate::fix::{ActionResult, ApplyReport, ApplySummary, FixAction};
use crate::wire::{ToolInfoV1, WireError};
use crate::ToolInfo;

/// Schema-exact wire representation of prism.fix.v1.
///
/// Carries the planned actions, and the apply results when an apply ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixReportV1 {
    pub schema: String,
    pub tool: ToolInfoV1,
    pub dataset: String,
    pub dry_run: bool,

    #[serde(default)]
    pub actions: Vec<FixAction>,

    #[serde(default)]
    pub results: Vec<ActionResult>,

    #[serde(default)]
    pub summary: ApplySummary,
}

impl FixReportV1 {
    pub fn new(
        tool: &ToolInfo,
        dataset: &str,
        actions: &[FixAction],
        report: &ApplyReport,
    ) -> Result<Self, WireError> {
        let tool = ToolInfoV1::try_from(tool).map_err(|_| WireError::MissingToolVersion {
            context: "fix",
        })?;
        Ok(Self {
            schema: crate::schema::PRISM_FIX_V1.to_string(),
            tool,
            dataset: dataset.to_string(),
            dry_run: report.dry_run,
            actions: actions.to_vec(),
            results: report.results.clone(),
            summary: report.summary.clone(),
        })
    }
}
