//! Adapter for an external standards validator (`bids-validator --json`).
//!
//! Tolerant by construction: whatever goes wrong outside the process boundary
//! becomes a single PRISM903 issue, never an error for the caller.

use crate::process::{self, CommandSpec};
use camino::Utf8Path;
use prism_types::issue::{Issue, IssueCode, IssueDetail, Severity};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_COMMAND: &[&str] = &["bids-validator", "--json"];

#[derive(Debug, Clone)]
pub struct ExternalValidator {
    command: Vec<String>,
    timeout: Duration,
}

impl Default for ExternalValidator {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl ExternalValidator {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Run against `dataset` and translate the findings.
    pub fn run(&self, dataset: &Utf8Path) -> Vec<Issue> {
        let mut argv = self.command.clone();
        argv.push(dataset.to_string());
        let program = argv.first().cloned().unwrap_or_default();

        let output = match process::run(&CommandSpec::new(argv, self.timeout)) {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "external validator did not run");
                return vec![failed(&program, e.to_string())];
            }
        };

        let status = output
            .code
            .map(|c| format!("exit code {c}"))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let with_stderr = |reason: &str| {
            let tail = output.stderr_tail();
            if tail.is_empty() {
                format!("{status}; {reason}")
            } else {
                format!("{status}; {reason}; stderr: {tail}")
            }
        };

        match translate_report(&output.stdout) {
            // A failing run that reports nothing has not validated anything.
            Ok(issues) if issues.is_empty() && !output.success => {
                let detail = with_stderr("empty report");
                warn!(%detail, "external validator failed without findings");
                vec![failed(&program, detail)]
            }
            Ok(issues) => {
                debug!(issues = issues.len(), code = ?output.code, "external validator finished");
                issues
            }
            Err(reason) => {
                let detail = with_stderr(&reason);
                warn!(%detail, "external validator output unusable");
                vec![failed(&program, detail)]
            }
        }
    }
}

fn failed(program: &str, detail: String) -> Issue {
    Issue::new(
        IssueCode::ExternalValidatorFailed,
        format!("external validator '{program}' failed: {detail}"),
    )
    .with_hint("check [external] in prism.toml or disable external validation")
}

#[derive(Debug, Deserialize)]
struct Report {
    issues: ReportIssues,
}

#[derive(Debug, Default, Deserialize)]
struct ReportIssues {
    #[serde(default)]
    errors: Vec<LegacyIssue>,
    #[serde(default)]
    warnings: Vec<LegacyIssue>,
    #[serde(default)]
    info: Vec<LegacyIssue>,
    /// Flat list used by newer validator releases.
    #[serde(default)]
    issues: Vec<FlatIssue>,
}

#[derive(Debug, Deserialize)]
struct LegacyIssue {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    files: Vec<LegacyFile>,
}

#[derive(Debug, Deserialize)]
struct LegacyFile {
    #[serde(default)]
    file: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRef {
    #[serde(default)]
    relative_path: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatIssue {
    code: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    issue_message: Option<String>,
    #[serde(default)]
    sub_code: Option<String>,
}

/// Translate validator JSON into PRISM501/502/503 issues, sorted by
/// (path, code, message).
pub fn translate_report(stdout: &str) -> Result<Vec<Issue>, String> {
    let start = stdout
        .find('{')
        .ok_or_else(|| "no JSON report on stdout".to_string())?;
    let report: Report = serde_json::from_str(stdout[start..].trim_end())
        .map_err(|e| format!("cannot parse report: {e}"))?;

    let mut out = Vec::new();
    let groups = [
        (Severity::Error, &report.issues.errors),
        (Severity::Warning, &report.issues.warnings),
        (Severity::Suggestion, &report.issues.info),
    ];
    for (severity, items) in groups {
        for item in items {
            let key = item
                .key
                .clone()
                .or_else(|| item.code.as_ref().map(|c| c.to_string().trim_matches('"').to_string()))
                .unwrap_or_else(|| "UNKNOWN".to_string());
            let reason = item.reason.clone().unwrap_or_default();
            let paths = item
                .files
                .iter()
                .filter_map(|f| f.file.as_ref())
                .filter_map(|f| f.relative_path.clone().or_else(|| f.path.clone()))
                .map(|p| relative(&p));
            out.push(external_issue(severity, &key, &reason).with_paths(paths));
        }
    }

    for item in &report.issues.issues {
        let severity = item
            .severity
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Severity::Warning);
        let key = match &item.sub_code {
            Some(sub) => format!("{}/{}", item.code, sub),
            None => item.code.clone(),
        };
        let reason = item.issue_message.clone().unwrap_or_default();
        let mut issue = external_issue(severity, &key, &reason);
        if let Some(loc) = &item.location {
            issue = issue.with_path(relative(loc));
        }
        out.push(issue);
    }

    out.sort_by_key(Issue::sort_key);
    Ok(out)
}

fn external_issue(severity: Severity, key: &str, reason: &str) -> Issue {
    let message = if reason.is_empty() {
        format!("[{key}]")
    } else {
        format!("[{key}] {}", reason.trim())
    };
    Issue::new(IssueCode::for_external_severity(severity), message).with_detail(
        IssueDetail::External {
            key: key.to_string(),
        },
    )
}

fn relative(p: &str) -> String {
    p.trim_start_matches('/').to_string()
}
