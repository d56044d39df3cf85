use camino::Utf8PathBuf;
use fs_err as fs;
use pretty_assertions::assert_eq;
use prism_core::settings::ExternalSettings;
use prism_core::{
    CancelToken, FixSettings, PluginFinding, PluginRegistry, SchemaRegistry, ValidateSettings,
    run_fix, run_validate,
};
use prism_fix::DatasetLock;
use prism_types::issue::{IssueCode, Severity};
use prism_types::scan::ScanPhase;
use std::time::Duration;
use tempfile::TempDir;

struct Dataset {
    _tmp: TempDir,
    root: Utf8PathBuf,
}

impl Dataset {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path");
        Self { _tmp: tmp, root }
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
    }
}

/// One subject whose survey file lacks a sidecar.
fn scenario_b() -> Dataset {
    let ds = Dataset::new();
    ds.write(
        "dataset_description.json",
        r#"{"Name": "S", "BIDSVersion": "1.8.0", "DatasetType": "raw"}"#,
    );
    ds.write("participants.tsv", "participant_id\nsub-01\n");
    ds.write("sub-01/survey/sub-01_task-x_survey.tsv", "q1\n1\n");
    ds
}

fn validate(ds: &Dataset, plugins: PluginRegistry) -> prism_types::scan::DatasetScanResult {
    let settings = ValidateSettings {
        lock_wait: Duration::from_millis(50),
        ..ValidateSettings::for_dataset(ds.root.clone())
    };
    run_validate(&settings, &SchemaRegistry::new(), plugins, &CancelToken::new())
        .expect("validate")
}

fn codes(result: &prism_types::scan::DatasetScanResult) -> Vec<&'static str> {
    result.issues.iter().map(|i| i.code.as_str()).collect()
}

#[test]
fn phases_are_recorded_in_order() {
    let ds = scenario_b();
    let result = validate(&ds, PluginRegistry::new());
    assert_eq!(
        result.phases,
        vec![
            ScanPhase::Init,
            ScanPhase::Scanning,
            ScanPhase::Aggregating,
            ScanPhase::Plugins,
            ScanPhase::Done
        ]
    );
    assert_eq!(codes(&result), vec!["PRISM201"]);
    assert_eq!(
        result.issues[0].primary_path(),
        "sub-01/survey/sub-01_task-x_survey.tsv"
    );
}

#[test]
fn failing_plugin_leaves_native_issues_alone() {
    let ds = scenario_b();
    let native = validate(&ds, PluginRegistry::new());

    let mut plugins = PluginRegistry::new();
    plugins.register_fn("always-fails", |_| anyhow::bail!("boom"));
    plugins.register_fn("notes", |ctx| {
        Ok(vec![PluginFinding::new(
            Severity::Suggestion,
            format!("{} issues so far", ctx.result.issues.len()),
        )])
    });
    let result = validate(&ds, plugins);

    assert_eq!(&result.issues[..native.issues.len()], &native.issues[..]);
    assert_eq!(codes(&result), vec!["PRISM201", "PRISM901", "PRISM913"]);
    assert!(result.issues[1].message.contains("always-fails"));
    assert_eq!(result.issues[2].message, "[notes] 1 issues so far");
}

#[cfg(unix)]
#[test]
fn discovered_plugins_run_from_dataset_dir() {
    let ds = scenario_b();
    ds.write(
        ".prism/validators/echo.toml",
        r#"command = ["sh", "-c", "cat >/dev/null; echo '[{\"severity\":\"warning\",\"message\":\"hi\"}]'"]"#,
    );
    ds.write(".prism/validators/broken.toml", "command = [");
    let result = validate(&ds, PluginRegistry::new());
    assert_eq!(codes(&result), vec!["PRISM201", "PRISM902", "PRISM912"]);
}

#[cfg(unix)]
#[test]
fn external_findings_follow_native_issues() {
    let ds = scenario_b();
    let settings = ValidateSettings {
        external: Some(ExternalSettings {
            command: vec![
                "sh".into(),
                "-c".into(),
                r#"echo '{"issues":{"errors":[],"warnings":[{"key":"README_FILE_MISSING","reason":"no README","files":[]}]}}'"#.into(),
            ],
            timeout: Duration::from_secs(10),
        }),
        ..ValidateSettings::for_dataset(ds.root.clone())
    };
    let result = run_validate(
        &settings,
        &SchemaRegistry::new(),
        PluginRegistry::new(),
        &CancelToken::new(),
    )
    .expect("validate");
    assert_eq!(codes(&result), vec!["PRISM201", "PRISM502"]);
    assert!(result.phases.contains(&ScanPhase::DelegatingExternal));
}

#[test]
fn held_lock_yields_dataset_locked_warning() {
    let ds = scenario_b();
    let _lock = DatasetLock::acquire(&ds.root, Duration::from_secs(1)).expect("lock");
    let result = validate(&ds, PluginRegistry::new());
    assert_eq!(codes(&result), vec!["PRISM904", "PRISM201"]);
}

#[test]
fn cancelled_run_skips_plugins() {
    let ds = scenario_b();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut plugins = PluginRegistry::new();
    plugins.register_fn("never", |_| anyhow::bail!("should not run"));
    let result = run_validate(
        &ValidateSettings::for_dataset(ds.root.clone()),
        &SchemaRegistry::new(),
        plugins,
        &cancel,
    )
    .expect("validate");
    assert!(result.incomplete);
    assert!(codes(&result).contains(&"PRISM905"));
    assert!(!codes(&result).contains(&"PRISM901"));
}

#[test]
fn fix_creates_sidecar_and_rescans_clean() {
    let ds = scenario_b();
    let settings = FixSettings {
        validate: ValidateSettings::for_dataset(ds.root.clone()),
        ..FixSettings::default()
    };
    let outcome = run_fix(&settings, &SchemaRegistry::new(), &CancelToken::new()).expect("fix");
    assert_eq!(outcome.report.lines(), vec![
        "PRISM201 create sub-01/survey/sub-01_task-x_survey.json".to_string()
    ]);
    assert!(ds.root.join("sub-01/survey/sub-01_task-x_survey.json").is_file());
    let after = outcome.after.as_ref().expect("rescan");
    assert_eq!(after.issues.iter().filter(|i| i.code == IssueCode::MissingSidecar).count(), 0);
    assert_eq!(outcome.remaining_errors(), 0);
}

#[test]
fn dry_run_fix_writes_nothing() {
    let ds = scenario_b();
    let settings = FixSettings {
        validate: ValidateSettings::for_dataset(ds.root.clone()),
        dry_run: true,
        ..FixSettings::default()
    };
    let outcome = run_fix(&settings, &SchemaRegistry::new(), &CancelToken::new()).expect("fix");
    assert!(outcome.after.is_none());
    assert_eq!(outcome.report.summary.would_apply, 1);
    assert!(!ds.root.join("sub-01/survey/sub-01_task-x_survey.json").exists());
    assert_eq!(outcome.remaining_errors(), 1);
}
