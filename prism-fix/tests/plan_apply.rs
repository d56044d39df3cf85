mod common;

use common::{Dataset, plan, scan};
use pretty_assertions::assert_eq;
use prism_fix::{ApplyOptions, DatasetLock, FixPolicy, apply};
use prism_types::fix::{ActionStatus, FixVerb};
use prism_types::issue::IssueCode;
use std::time::Duration;

const SURVEY_ROW: &str = "q1\n1\n";

fn messy() -> Dataset {
    let ds = Dataset::new();
    ds.write("sub-01/survey/sub-01_task-x_survey.tsv", SURVEY_ROW);
    ds.write("sub-02/survey/sub-02_task-x_survey.tsv", SURVEY_ROW);
    ds.write(
        "sub-02/survey/sub-02_task-x_survey.json",
        r#"{"TaskName": "x"}"#,
    );
    ds
}

#[test]
fn plan_groups_one_action_per_artifact() {
    let ds = messy();
    let (_, actions) = plan(&ds.root);
    let lines: Vec<String> = actions.iter().map(|a| a.line()).collect();
    assert_eq!(
        lines,
        vec![
            "PRISM001 create dataset_description.json",
            "PRISM002 create participants.tsv",
            "PRISM201 create sub-01/survey/sub-01_task-x_survey.json",
            "PRISM301 update sub-02/survey/sub-02_task-x_survey.json",
        ]
    );
    let update = &actions[3];
    assert_eq!(update.action, FixVerb::Update);
    assert_eq!(update.resolves, 2);
}

#[test]
fn plan_apply_plan_reaches_fixed_point() {
    let ds = messy();
    let (_, actions) = plan(&ds.root);
    let report = apply(&ds.root, &actions, &ApplyOptions::default()).expect("apply");
    assert_eq!(report.summary.applied, 4);
    assert_eq!(report.summary.files_modified, 4);
    assert!(!ds.exists(".prism.lock"));

    let (result, again) = plan(&ds.root);
    assert!(again.is_empty(), "second plan: {:?}", again);
    assert_eq!(result.summary.fixable, 0);

    let sidecar: serde_json::Value =
        serde_json::from_str(&ds.read("sub-02/survey/sub-02_task-x_survey.json")).expect("json");
    assert_eq!(sidecar["TaskName"], "x");
    assert_eq!(sidecar["Language"], "en");
    assert_eq!(ds.read("participants.tsv"), "participant_id\nsub-01\nsub-02\n");

    // Reapplying stale actions changes nothing.
    let report = apply(&ds.root, &actions, &ApplyOptions::default()).expect("apply");
    assert_eq!(report.summary.unchanged, 4);
    assert_eq!(report.summary.files_modified, 0);
    assert!(report.patch.is_empty());
}

#[test]
fn dry_run_previews_without_writing() {
    let ds = messy();
    let (_, actions) = plan(&ds.root);
    let opts = ApplyOptions {
        dry_run: true,
        ..ApplyOptions::default()
    };
    let report = apply(&ds.root, &actions, &opts).expect("apply");
    assert!(report.dry_run);
    assert_eq!(report.summary.would_apply, 4);
    assert_eq!(report.summary.files_modified, 0);
    assert!(
        report
            .patch
            .contains("diff --git a/dataset_description.json b/dataset_description.json")
    );
    assert!(report.patch.contains("+sub-02"));
    assert!(!ds.exists("dataset_description.json"));
    assert!(
        report
            .results
            .iter()
            .all(|r| r.status == ActionStatus::WouldApply && r.sha256_after.is_some())
    );
}

#[test]
fn unlisted_subjects_are_appended_once() {
    let ds = Dataset::new();
    ds.write(
        "dataset_description.json",
        r#"{"Name": "S", "BIDSVersion": "1.8.0", "DatasetType": "raw"}"#,
    );
    ds.write("participants.tsv", "participant_id\tage\nsub-01\t30\n");
    for s in ["01", "02", "03"] {
        ds.write(&format!("sub-{s}/survey/sub-{s}_task-x_survey.tsv"), SURVEY_ROW);
    }
    ds.write(
        "task-x_survey.json",
        r#"{"TaskName": "x", "Language": "en", "Items": {}}"#,
    );

    let (result, actions) = plan(&ds.root);
    assert_eq!(result.summary.by_code.get("PRISM004"), Some(&2));
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].code, IssueCode::UnlistedSubject);

    apply(&ds.root, &actions, &ApplyOptions::default()).expect("apply");
    assert_eq!(
        ds.read("participants.tsv"),
        "participant_id\tage\nsub-01\t30\nsub-02\tn/a\nsub-03\tn/a\n"
    );
    assert!(scan(&ds.root).issues.is_empty());
}

#[test]
fn policy_skips_denied_codes() {
    let ds = messy();
    let (_, actions) = plan(&ds.root);
    let opts = ApplyOptions {
        policy: FixPolicy {
            allow: vec![],
            deny: vec!["PRISM2*".into(), "PRISM3*".into()],
        },
        ..ApplyOptions::default()
    };
    let report = apply(&ds.root, &actions, &opts).expect("apply");
    assert_eq!(report.summary.applied, 2);
    assert_eq!(report.summary.skipped, 2);
    assert!(!ds.exists("sub-01/survey/sub-01_task-x_survey.json"));
    assert!(ds.exists("dataset_description.json"));
}

#[test]
fn unparsable_target_fails_that_action_only() {
    let ds = messy();
    let (_, actions) = plan(&ds.root);
    ds.write("sub-02/survey/sub-02_task-x_survey.json", "{\"TaskName\": ");
    let report = apply(&ds.root, &actions, &ApplyOptions::default()).expect("apply");
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.applied, 3);
    let failed = report
        .results
        .iter()
        .find(|r| r.status == ActionStatus::Failed)
        .expect("failed result");
    assert_eq!(failed.code, IssueCode::MissingRequiredField);
}

#[test]
fn held_lock_blocks_apply() {
    let ds = messy();
    let (_, actions) = plan(&ds.root);
    let _held = DatasetLock::acquire(&ds.root, Duration::from_secs(1)).expect("lock");
    let opts = ApplyOptions {
        lock_timeout: Duration::from_millis(100),
        ..ApplyOptions::default()
    };
    let err = apply(&ds.root, &actions, &opts).expect_err("locked");
    assert!(err.is_locked());
    assert_eq!(err.exit_code(), 2);
    assert!(!ds.exists("dataset_description.json"));
}
