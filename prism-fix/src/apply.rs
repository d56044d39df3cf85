use crate::error::FixError;
use crate::lock::{DEFAULT_LOCK_TIMEOUT, DatasetLock};
use crate::planner::FixPolicy;
use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};
use diffy::PatchFormatter;
use fs_err as fs;
use prism_types::fix::{
    ActionResult, ActionStatus, ApplyReport, ApplySummary, FixAction, FixPayload,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

const TSV_MISSING: &str = "n/a";

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub dry_run: bool,
    pub policy: FixPolicy,
    pub lock_timeout: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            policy: FixPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Apply fix actions under `root`. With `opts.dry_run` nothing is written and
/// no lock is taken, but results and a patch are still produced.
///
/// Each action merges its payload into the current content of its target; a
/// target whose merged bytes equal the current bytes is left untouched.
pub fn apply(
    root: &Utf8Path,
    actions: &[FixAction],
    opts: &ApplyOptions,
) -> Result<ApplyReport, FixError> {
    let _lock = if opts.dry_run {
        None
    } else {
        Some(DatasetLock::acquire(root, opts.lock_timeout)?)
    };

    let mut before: BTreeMap<Utf8PathBuf, Option<String>> = BTreeMap::new();
    for action in actions {
        if before.contains_key(&action.target_path) {
            continue;
        }
        let abs = root.join(&action.target_path);
        let contents = if abs.is_file() {
            Some(fs::read_to_string(&abs).with_context(|| format!("read {}", abs))?)
        } else {
            None
        };
        before.insert(action.target_path.clone(), contents);
    }
    let mut current = before.clone();

    let mut results = Vec::with_capacity(actions.len());
    let mut summary = ApplySummary::default();

    for action in actions {
        summary.attempted += 1;
        let mut result = ActionResult {
            action_id: action.id.clone(),
            code: action.code,
            verb: action.action,
            target: action.target_path.clone(),
            status: ActionStatus::Skipped,
            message: None,
            sha256_before: None,
            sha256_after: None,
        };

        if let Err(reason) = opts.policy.allows(action.code) {
            result.message = Some(format!("skipped: {reason}"));
            summary.skipped += 1;
            results.push(result);
            continue;
        }

        let existing = current.get(&action.target_path).cloned().flatten();
        result.sha256_before = existing.as_deref().map(|s| sha256_hex(s.as_bytes()));

        let merged = match &action.payload {
            FixPayload::JsonFields { fields } => merge_json(existing.as_deref(), fields),
            FixPayload::TsvRows { header, rows } => merge_tsv(existing.as_deref(), header, rows),
        };
        let merged = match merged {
            Ok(m) => m,
            Err(e) => {
                result.status = ActionStatus::Failed;
                result.message = Some(format!("{e:#}"));
                summary.failed += 1;
                results.push(result);
                continue;
            }
        };

        result.sha256_after = Some(sha256_hex(merged.as_bytes()));
        if existing.as_deref() == Some(merged.as_str()) {
            result.status = ActionStatus::Unchanged;
            summary.unchanged += 1;
        } else {
            if opts.dry_run {
                result.status = ActionStatus::WouldApply;
                summary.would_apply += 1;
            } else {
                result.status = ActionStatus::Applied;
                summary.applied += 1;
            }
            current.insert(action.target_path.clone(), Some(merged));
        }
        debug!(line = %result.line(), status = ?result.status, "fix action evaluated");
        results.push(result);
    }

    let patch = render_patch(&before, &current);

    if !opts.dry_run {
        // Write only changed files.
        for (path, new_contents) in &current {
            let Some(new_contents) = new_contents else {
                continue;
            };
            if before.get(path).cloned().flatten().as_ref() == Some(new_contents) {
                continue;
            }
            let abs = root.join(path);
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
            }
            fs::write(&abs, new_contents).with_context(|| format!("write {}", abs))?;
            summary.files_modified += 1;
        }
        info!(
            applied = summary.applied,
            unchanged = summary.unchanged,
            files = summary.files_modified,
            "fixes applied"
        );
    }

    Ok(ApplyReport {
        dry_run: opts.dry_run,
        results,
        summary,
        patch,
    })
}

/// Add `fields` that `existing` lacks. Existing keys are never touched, and
/// when nothing is added the original text comes back byte-for-byte.
pub fn merge_json(existing: Option<&str>, fields: &Map<String, Value>) -> anyhow::Result<String> {
    let Some(text) = existing else {
        return to_pretty(&Value::Object(fields.clone()));
    };
    let value: Value = serde_json::from_str(text).context("existing file is not valid JSON")?;
    let Value::Object(mut map) = value else {
        bail!("existing file is not a JSON object");
    };

    let mut added = 0usize;
    for (k, v) in fields {
        if !map.contains_key(k) {
            map.insert(k.clone(), v.clone());
            added += 1;
        }
    }
    if added == 0 {
        return Ok(text.to_string());
    }
    to_pretty(&Value::Object(map))
}

fn to_pretty(value: &Value) -> anyhow::Result<String> {
    let mut s = serde_json::to_string_pretty(value).context("serialize JSON")?;
    s.push('\n');
    Ok(s)
}

/// Append `rows` whose id (first column of `header`) is not yet present.
/// Rows are aligned to the existing header; absent columns get `n/a`.
/// Ids compare with or without the `sub-` prefix.
pub fn merge_tsv(
    existing: Option<&str>,
    header: &[String],
    rows: &[Vec<String>],
) -> anyhow::Result<String> {
    let Some(id_col) = header.first() else {
        bail!("TSV payload has no header");
    };

    let text = existing.unwrap_or("");
    if text.trim().is_empty() {
        let mut out = header.join("\t");
        out.push('\n');
        for row in rows {
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        return Ok(out);
    }

    let mut lines = text.lines();
    let file_header: Vec<&str> = lines
        .next()
        .unwrap_or("")
        .split('\t')
        .map(str::trim)
        .collect();
    let Some(id_idx) = file_header.iter().position(|h| h == id_col) else {
        bail!("existing header has no '{}' column", id_col);
    };

    let mut known: Vec<String> = lines
        .filter_map(|l| l.split('\t').nth(id_idx))
        .map(|v| normalize_id(v.trim()))
        .collect();

    let mut appended = Vec::new();
    for row in rows {
        let Some(id) = row.first() else {
            continue;
        };
        let norm = normalize_id(id);
        if known.contains(&norm) {
            continue;
        }
        let cells: Vec<&str> = file_header
            .iter()
            .map(|col| {
                header
                    .iter()
                    .position(|h| h == col)
                    .and_then(|i| row.get(i))
                    .map(String::as_str)
                    .unwrap_or(TSV_MISSING)
            })
            .collect();
        appended.push(cells.join("\t"));
        known.push(norm);
    }

    if appended.is_empty() {
        return Ok(text.to_string());
    }
    let mut out = text.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    for line in appended {
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

fn normalize_id(id: &str) -> String {
    id.strip_prefix("sub-").unwrap_or(id).to_string()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn render_patch(
    before: &BTreeMap<Utf8PathBuf, Option<String>>,
    after: &BTreeMap<Utf8PathBuf, Option<String>>,
) -> String {
    let mut out = String::new();
    let mut formatter = PatchFormatter::new();

    for (path, old) in before {
        let old = old.as_deref().unwrap_or("");
        let new = after
            .get(path)
            .and_then(|n| n.as_deref())
            .unwrap_or(old);
        if old == new {
            continue;
        }

        out.push_str(&format!("diff --git a/{0} b/{0}\n", path));
        out.push_str(&format!("--- a/{0}\n+++ b/{0}\n", path));

        let patch = diffy::create_patch(old, new);
        let body = formatter.fmt_patch(&patch).to_string();
        // diffy repeats the ---/+++ header; keep ours only.
        for line in body.lines().skip_while(|l| l.starts_with("---") || l.starts_with("+++")) {
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}
