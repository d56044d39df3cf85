use crate::issue::IssueCode;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a fix action does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixVerb {
    Create,
    Update,
}

impl FixVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            FixVerb::Create => "create",
            FixVerb::Update => "update",
        }
    }
}

impl fmt::Display for FixVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content a fix contributes. Appliers merge it into whatever is on disk and
/// never overwrite existing keys or rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixPayload {
    JsonFields {
        fields: serde_json::Map<String, serde_json::Value>,
    },
    TsvRows {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

/// One remediation, computed from one or more same-code issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAction {
    /// Deterministic id (UUIDv5 over code, verb, target and payload).
    pub id: String,
    pub code: IssueCode,
    pub action: FixVerb,

    /// Relative to the dataset root.
    pub target_path: Utf8PathBuf,
    pub payload: FixPayload,

    /// Number of issues this action resolves.
    #[serde(default)]
    pub resolves: u64,
}

impl FixAction {
    /// Machine-readable preview line: `CODE verb target`.
    pub fn line(&self) -> String {
        format_action_line(self.code, self.action, self.target_path.as_str())
    }
}

pub fn format_action_line(code: IssueCode, verb: FixVerb, target: &str) -> String {
    format!("{} {} {}", code, verb, target)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLine {
    pub code: IssueCode,
    pub verb: FixVerb,
    pub target: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionLineError {
    #[error("action line has too few fields: '{0}'")]
    TooFewFields(String),
    #[error(transparent)]
    Code(#[from] crate::issue::UnknownCode),
    #[error("unknown verb '{0}'")]
    Verb(String),
}

impl FromStr for ActionLine {
    type Err = ActionLineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_action_line(s)
    }
}

/// Parse a line produced by [`format_action_line`]. Targets may contain spaces.
pub fn parse_action_line(line: &str) -> Result<ActionLine, ActionLineError> {
    let mut parts = line.trim_end_matches(['\r', '\n']).splitn(3, ' ');
    let (Some(code), Some(verb), Some(target)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ActionLineError::TooFewFields(line.to_string()));
    };
    if target.is_empty() {
        return Err(ActionLineError::TooFewFields(line.to_string()));
    }
    let verb = match verb {
        "create" => FixVerb::Create,
        "update" => FixVerb::Update,
        other => return Err(ActionLineError::Verb(other.to_string())),
    };
    Ok(ActionLine {
        code: code.parse()?,
        verb,
        target: Utf8PathBuf::from(target),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Written to disk.
    Applied,
    /// Merged content equals current content byte-for-byte.
    Unchanged,
    /// Dry run: would have been written.
    WouldApply,
    /// Blocked by fix policy.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub code: IssueCode,
    pub verb: FixVerb,
    pub target: Utf8PathBuf,
    pub status: ActionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_after: Option<String>,
}

impl ActionResult {
    pub fn line(&self) -> String {
        format_action_line(self.code, self.verb, self.target.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub attempted: u64,
    pub applied: u64,
    pub unchanged: u64,
    pub would_apply: u64,
    pub skipped: u64,
    pub failed: u64,
    pub files_modified: u64,
}

/// Outcome of applying (or previewing) a set of fix actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub dry_run: bool,

    #[serde(default)]
    pub results: Vec<ActionResult>,

    #[serde(default)]
    pub summary: ApplySummary,

    /// Unified diff of every change (written or previewed).
    #[serde(default)]
    pub patch: String,
}

impl ApplyReport {
    pub fn lines(&self) -> Vec<String> {
        self.results.iter().map(ActionResult::line).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_line_roundtrips_with_spaces_in_target() {
        let line = format_action_line(
            IssueCode::MissingSidecar,
            FixVerb::Create,
            "sub-01/survey/my file.json",
        );
        assert_eq!(line, "PRISM201 create sub-01/survey/my file.json");
        let parsed = parse_action_line(&line).expect("parse");
        assert_eq!(parsed.code, IssueCode::MissingSidecar);
        assert_eq!(parsed.verb, FixVerb::Create);
        assert_eq!(parsed.target.as_str(), "sub-01/survey/my file.json");
    }

    #[test]
    fn action_line_rejects_garbage() {
        assert!(matches!(
            parse_action_line("PRISM201 create"),
            Err(ActionLineError::TooFewFields(_))
        ));
        assert!(matches!(
            parse_action_line("PRISM201 delete x.json"),
            Err(ActionLineError::Verb(_))
        ));
        assert!(matches!(
            parse_action_line("NOPE create x.json"),
            Err(ActionLineError::Code(_))
        ));
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let mut fields = serde_json::Map::new();
        fields.insert("Name".into(), serde_json::json!("TODO"));
        let payload = FixPayload::JsonFields { fields };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], "json_fields");
        assert_eq!(json["fields"]["Name"], "TODO");
    }
}
