//! Validate and fix pipelines, extracted from the CLI.
//!
//! The pipelines read the dataset through `prism-domain`'s view and only the
//! fix engine writes to it. Report artifacts go through [`WritePort`].

use crate::ports::WritePort;
use crate::settings::{FixSettings, ValidateSettings};
use anyhow::Context;
use camino::Utf8Path;
use prism_domain::{CancelToken, FsDatasetView, Validator};
use prism_external::ExternalValidator;
use prism_fix::{ApplyOptions, DatasetLock, FixPlanner, FixPolicy, apply};
use prism_plugins::{PluginContext, PluginRegistry};
use prism_render::{render_apply_md, render_scan_md};
use prism_schema::{ConfigurationError, SchemaRegistry, SpecVersion};
use prism_types::ToolInfo;
use prism_types::fix::{ApplyReport, FixAction};
use prism_types::issue::{Issue, IssueCode};
use prism_types::scan::{DatasetScanResult, ScanPhase};
use prism_types::wire::{FixReportV1, ScanReportV1};
use tracing::{debug, info, warn};

/// Only configuration problems abort a run; everything else the dataset can
/// throw at us becomes an Issue.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl RunError {
    /// Exit code 2 = configuration or tool error.
    pub fn exit_code(&self) -> u8 {
        2
    }
}

/// Registry honouring `settings.schema_dir`.
pub fn registry_for(settings: &ValidateSettings) -> SchemaRegistry {
    match &settings.schema_dir {
        Some(dir) => SchemaRegistry::with_schema_dir(dir.clone()),
        None => SchemaRegistry::new(),
    }
}

/// Run the validate pipeline: Scanning, Aggregating, then the optional
/// external pass and the plugins.
///
/// `plugins` carries in-process plugins; manifests from the plugin directory
/// are discovered on top when plugins are enabled.
pub fn run_validate(
    settings: &ValidateSettings,
    registry: &SchemaRegistry,
    mut plugins: PluginRegistry,
    cancel: &CancelToken,
) -> Result<DatasetScanResult, RunError> {
    let spec = registry.load(&settings.schema_version)?;
    let root = &settings.dataset_root;
    ensure_dataset_dir(root)?;

    let mut result = scan_native(settings, &spec, cancel);

    if result.incomplete {
        debug!("run cancelled; skipping external validator and plugins");
        result.finish();
        return Ok(result);
    }

    if let Some(external) = &settings.external {
        result.enter(ScanPhase::DelegatingExternal);
        let issues = ExternalValidator::new(external.command.clone(), external.timeout).run(root);
        debug!(issues = issues.len(), "external validator finished");
        result.extend_issues(issues);
    }

    result.enter(ScanPhase::Plugins);
    if settings.plugins_enabled {
        let dir = settings.plugin_dir_abs();
        if dir.is_dir() {
            plugins.discover(&dir);
        }
    }
    if !plugins.is_empty() || !plugins.load_issues().is_empty() {
        let snapshot = result.clone();
        let ctx = PluginContext {
            dataset: root,
            result: &snapshot,
        };
        let issues = plugins.run_all(&ctx);
        result.extend_issues(issues);
    }

    result.finish();
    info!(
        errors = result.summary.errors,
        warnings = result.summary.warnings,
        suggestions = result.summary.suggestions,
        "validation finished"
    );
    Ok(result)
}

/// Native phases only. A held fix lock is waited on (bounded), and if it is
/// still held the scan proceeds with a PRISM904 warning.
fn scan_native(
    settings: &ValidateSettings,
    spec: &SpecVersion,
    cancel: &CancelToken,
) -> DatasetScanResult {
    let root = &settings.dataset_root;
    let mut result = DatasetScanResult::new(root.clone(), spec.id());

    if !DatasetLock::wait_released(root, settings.lock_wait) {
        warn!(dataset = %root, "dataset still locked; scanning anyway");
        result.extend_issues([Issue::new(
            IssueCode::DatasetLocked,
            "dataset was locked by a concurrent fix; results may reflect a partial write",
        )
        .with_path(prism_fix::LOCK_FILE)]);
    }

    let view = FsDatasetView::new(root.clone());
    Validator::new(&view, spec)
        .with_jobs(settings.jobs)
        .with_cancel(cancel.clone())
        .run(&mut result);
    result
}

fn ensure_dataset_dir(root: &Utf8Path) -> anyhow::Result<()> {
    if !root.is_dir() {
        anyhow::bail!("dataset root {} is not a directory", root);
    }
    Ok(())
}

/// Outcome of [`run_fix`].
#[derive(Debug, Clone)]
pub struct FixOutcome {
    /// Native scan the plan was built from.
    pub scan: DatasetScanResult,
    pub actions: Vec<FixAction>,
    pub report: ApplyReport,
    /// Native re-scan after writing; `None` on dry runs.
    pub after: Option<DatasetScanResult>,
}

impl FixOutcome {
    /// Errors that remain after the fix (or that a dry run would leave).
    pub fn remaining_errors(&self) -> u64 {
        match &self.after {
            Some(after) => after.summary.errors,
            None => self.scan.summary.errors,
        }
    }
}

/// Run the fix pipeline: native scan, plan, apply (or preview), re-scan.
///
/// Plugins and the external validator are not consulted; none of their
/// findings are fixable.
pub fn run_fix(
    settings: &FixSettings,
    registry: &SchemaRegistry,
    cancel: &CancelToken,
) -> Result<FixOutcome, RunError> {
    let vs = &settings.validate;
    let spec = registry.load(&vs.schema_version)?;
    ensure_dataset_dir(&vs.dataset_root)?;

    let mut scan = scan_native(vs, &spec, cancel);
    scan.finish();
    if scan.incomplete {
        return Err(
            anyhow::anyhow!("scan cancelled; refusing to plan fixes from a partial result").into(),
        );
    }

    let view = FsDatasetView::new(vs.dataset_root.clone());
    let actions = FixPlanner::new(&view, &spec).plan(&scan.issues);
    debug!(actions = actions.len(), "fix plan ready");

    let opts = ApplyOptions {
        dry_run: settings.dry_run,
        policy: FixPolicy {
            allow: settings.allow.clone(),
            deny: settings.deny.clone(),
        },
        lock_timeout: settings.lock_timeout,
    };
    let report = apply(&vs.dataset_root, &actions, &opts)
        .map_err(anyhow::Error::from)
        .context("apply fixes")?;

    let after = if settings.dry_run {
        None
    } else {
        let mut after = scan_native(vs, &spec, cancel);
        after.finish();
        Some(after)
    };

    Ok(FixOutcome {
        scan,
        actions,
        report,
        after,
    })
}

/// Write `report.json` (`prism.scan.v1`) and `report.md` into `out_dir`.
pub fn write_scan_artifacts(
    result: &DatasetScanResult,
    tool: &ToolInfo,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    let wire = ScanReportV1::from_result(result, tool).context("convert scan to wire")?;
    let json = serde_json::to_string_pretty(&wire).context("serialize scan report")?;
    writer.write_file(&out_dir.join("report.json"), json.as_bytes())?;

    let md = render_scan_md(result);
    writer.write_file(&out_dir.join("report.md"), md.as_bytes())?;
    Ok(())
}

/// Write `fix.json` (`prism.fix.v1`), `fix.md` and `patch.diff` into `out_dir`.
pub fn write_fix_artifacts(
    outcome: &FixOutcome,
    tool: &ToolInfo,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    let wire = FixReportV1::new(
        tool,
        outcome.scan.dataset_root.as_str(),
        &outcome.actions,
        &outcome.report,
    )
    .context("convert fix report to wire")?;
    let json = serde_json::to_string_pretty(&wire).context("serialize fix report")?;
    writer.write_file(&out_dir.join("fix.json"), json.as_bytes())?;

    let md = render_apply_md(&outcome.report);
    writer.write_file(&out_dir.join("fix.md"), md.as_bytes())?;

    writer.write_file(&out_dir.join("patch.diff"), outcome.report.patch.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FsWritePort;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        (temp, root)
    }

    #[test]
    fn unknown_version_is_configuration_error() {
        let (_t, root) = temp_root();
        let settings = ValidateSettings {
            schema_version: "9.9.9".into(),
            ..ValidateSettings::for_dataset(root)
        };
        let err = run_validate(
            &settings,
            &SchemaRegistry::new(),
            PluginRegistry::new(),
            &CancelToken::new(),
        )
        .expect_err("unknown version");
        assert!(matches!(err, RunError::Configuration(ref e) if e.is_unknown_version()));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn missing_root_is_internal_error() {
        let (_t, root) = temp_root();
        let settings = ValidateSettings::for_dataset(root.join("nope"));
        let err = run_validate(
            &settings,
            &SchemaRegistry::new(),
            PluginRegistry::new(),
            &CancelToken::new(),
        )
        .expect_err("missing dir");
        assert!(matches!(err, RunError::Internal(_)));
    }

    #[test]
    fn artifacts_are_written() {
        let (_t, root) = temp_root();
        let settings = ValidateSettings::for_dataset(root.clone());
        let result = run_validate(
            &settings,
            &SchemaRegistry::new(),
            PluginRegistry::new(),
            &CancelToken::new(),
        )
        .expect("validate");

        let out = root.join("out");
        write_scan_artifacts(&result, &ToolInfo::prism("0.1.0"), &out, &FsWritePort)
            .expect("write");
        let json = std::fs::read_to_string(out.join("report.json")).expect("json");
        assert!(json.contains("\"schema\": \"prism.scan.v1\""));
        assert!(json.contains("PRISM001"));
        assert!(out.join("report.md").is_file());
    }
}
