//! Rendering helpers (markdown and plain text) for human-readable reports.

use prism_types::fix::{ActionStatus, ApplyReport, FixAction, FixPayload};
use prism_types::issue::{Issue, Severity};
use prism_types::scan::DatasetScanResult;

/// One line per issue: `SEVERITY CODE path: message`.
pub fn render_issue_line(issue: &Issue) -> String {
    let path = issue.primary_path();
    if path.is_empty() {
        format!("{} {}: {}", issue.severity, issue.code, issue.message)
    } else {
        format!(
            "{} {} {}: {}",
            issue.severity, issue.code, path, issue.message
        )
    }
}

pub fn render_scan_text(result: &DatasetScanResult) -> String {
    let mut out = String::new();
    for issue in &result.issues {
        out.push_str(&render_issue_line(issue));
        out.push('\n');
    }
    out.push_str(&format!(
        "{} error(s), {} warning(s), {} suggestion(s); {} fixable\n",
        result.summary.errors,
        result.summary.warnings,
        result.summary.suggestions,
        result.summary.fixable
    ));
    if result.incomplete {
        out.push_str("result is incomplete (run cancelled)\n");
    }
    out
}

pub fn render_scan_md(result: &DatasetScanResult) -> String {
    let mut out = String::new();
    out.push_str("# prism validate\n\n");
    out.push_str(&format!("- Dataset: `{}`\n", result.dataset_root));
    out.push_str(&format!("- Schema version: `{}`\n", result.spec_version));
    out.push_str(&format!(
        "- Errors: {}\n- Warnings: {}\n- Suggestions: {}\n- Fixable: {}\n",
        result.summary.errors,
        result.summary.warnings,
        result.summary.suggestions,
        result.summary.fixable
    ));
    if result.incomplete {
        out.push_str("- Incomplete: `true`\n");
    }
    out.push('\n');

    if !result.inventory.modalities.is_empty() {
        out.push_str("## Inventory\n\n");
        out.push_str("| Modality | Data files | Subjects | Tasks |\n");
        out.push_str("|---|---|---|---|\n");
        for (modality, inv) in &result.inventory.modalities {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                modality,
                inv.data_files,
                inv.subjects.len(),
                inv.tasks.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        out.push('\n');
    }

    out.push_str("## Issues\n\n");
    if result.issues.is_empty() {
        out.push_str("_No issues._\n");
        return out;
    }

    for severity in [Severity::Error, Severity::Warning, Severity::Suggestion] {
        let group: Vec<&Issue> = result
            .issues
            .iter()
            .filter(|i| i.severity == severity)
            .collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("### {} ({})\n\n", severity_heading(severity), group.len()));
        for issue in group {
            let paths = if issue.affected_paths.is_empty() {
                "-".to_string()
            } else {
                issue
                    .affected_paths
                    .iter()
                    .map(|p| format!("`{}`", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            out.push_str(&format!(
                "- `{}` {}: {}{}\n",
                issue.code,
                paths,
                issue.message,
                if issue.fixable { " _(fixable)_" } else { "" }
            ));
            if let Some(hint) = &issue.fix_hint {
                out.push_str(&format!("  - Hint: {}\n", hint));
            }
        }
        out.push('\n');
    }

    out
}

pub fn render_plan_md(actions: &[FixAction]) -> String {
    let mut out = String::new();
    out.push_str("# prism fix plan\n\n");
    out.push_str(&format!("- Actions: {}\n", actions.len()));
    out.push_str(&format!(
        "- Issues resolved: {}\n\n",
        actions.iter().map(|a| a.resolves).sum::<u64>()
    ));

    out.push_str("## Actions\n\n");
    if actions.is_empty() {
        out.push_str("_No actions planned._\n");
        return out;
    }

    for (i, action) in actions.iter().enumerate() {
        out.push_str(&format!("### {}. {}\n\n", i + 1, action.line()));
        out.push_str(&format!("- Id: `{}`\n", action.id));
        match &action.payload {
            FixPayload::JsonFields { fields } => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                out.push_str(&format!("- Fields: {}\n", keys.join(", ")));
            }
            FixPayload::TsvRows { rows, .. } => {
                let ids: Vec<&str> = rows
                    .iter()
                    .filter_map(|r| r.first().map(String::as_str))
                    .collect();
                out.push_str(&format!("- Rows: {}\n", ids.join(", ")));
            }
        }
        out.push('\n');
    }

    out
}

pub fn render_apply_md(report: &ApplyReport) -> String {
    let mut out = String::new();
    out.push_str(if report.dry_run {
        "# prism fix (dry run)\n\n"
    } else {
        "# prism fix\n\n"
    });
    let s = &report.summary;
    out.push_str(&format!(
        "- Attempted: {}\n- Applied: {}\n- Would apply: {}\n- Unchanged: {}\n- Skipped: {}\n- Failed: {}\n- Files modified: {}\n\n",
        s.attempted, s.applied, s.would_apply, s.unchanged, s.skipped, s.failed, s.files_modified
    ));

    out.push_str("## Results\n\n");
    if report.results.is_empty() {
        out.push_str("_No results._\n");
        return out;
    }

    for (i, r) in report.results.iter().enumerate() {
        out.push_str(&format!("### {}. {}\n\n", i + 1, r.line()));
        out.push_str(&format!("- Status: `{}`\n", status_label(r.status)));
        if let Some(msg) = &r.message {
            out.push_str(&format!("- Message: {}\n", msg));
        }
        if r.sha256_before.is_some() || r.sha256_after.is_some() {
            let before = r.sha256_before.as_deref().unwrap_or("-");
            let after = r.sha256_after.as_deref().unwrap_or("-");
            out.push_str(&format!("- sha256: {} → {}\n", before, after));
        }
        out.push('\n');
    }

    if !report.patch.is_empty() {
        out.push_str("## Patch\n\n```diff\n");
        out.push_str(&report.patch);
        out.push_str("```\n");
    }

    out
}

/// The machine-readable `CODE verb target` lines, one per action result.
pub fn render_apply_lines(report: &ApplyReport) -> String {
    let mut out = String::new();
    for line in report.lines() {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Short explanation of one code for `prism explain`.
pub fn render_code_md(code: prism_types::issue::IssueCode) -> String {
    format!(
        "# {}\n\n- Title: {}\n- Severity: `{}`\n- Fixable: `{}`\n- Class: `{}`\n",
        code,
        code.title(),
        code.severity(),
        code.fixable(),
        serde_json::to_value(code.class())
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    )
}

fn severity_heading(s: Severity) -> &'static str {
    match s {
        Severity::Error => "Errors",
        Severity::Warning => "Warnings",
        Severity::Suggestion => "Suggestions",
    }
}

fn status_label(s: ActionStatus) -> &'static str {
    match s {
        ActionStatus::Applied => "applied",
        ActionStatus::Unchanged => "unchanged",
        ActionStatus::WouldApply => "would_apply",
        ActionStatus::Skipped => "skipped",
        ActionStatus::Failed => "failed",
    }
}
