mod common;

use common::{Dataset, SURVEY_SIDECAR};
use pretty_assertions::assert_eq;
use prism_domain::{CancelToken, FsDatasetView, Validator};
use prism_schema::SchemaRegistry;
use prism_types::issue::{IssueCode, IssueDetail, Severity};
use prism_types::scan::{DatasetScanResult, ScanPhase};

fn scan(ds: &Dataset) -> DatasetScanResult {
    scan_with(ds, CancelToken::new(), 2)
}

fn scan_with(ds: &Dataset, cancel: CancelToken, jobs: usize) -> DatasetScanResult {
    let registry = SchemaRegistry::new();
    let spec = registry.load("stable").expect("schemas");
    let view = FsDatasetView::new(ds.root.clone());
    let mut result = DatasetScanResult::new(ds.root.clone(), spec.id());
    Validator::new(&view, &spec)
        .with_jobs(jobs)
        .with_cancel(cancel)
        .run(&mut result);
    result
}

fn codes(result: &DatasetScanResult) -> Vec<&'static str> {
    result.issues.iter().map(|i| i.code.as_str()).collect()
}

#[test]
fn valid_dataset_has_no_issues() {
    let ds = Dataset::with_root(&["01", "02"]);
    for s in ["01", "02"] {
        ds.write(&format!("sub-{s}/survey/sub-{s}_task-x_survey.tsv"), "q1\n1\n");
    }
    ds.write("task-x_survey.json", SURVEY_SIDECAR);

    let result = scan(&ds);
    assert_eq!(codes(&result), Vec::<&str>::new());
    assert_eq!(
        result.phases,
        vec![ScanPhase::Init, ScanPhase::Scanning, ScanPhase::Aggregating]
    );
    assert_eq!(result.inventory.modalities["survey"].data_files, 2);
}

#[test]
fn missing_dataset_description_is_one_fixable_error() {
    let ds = Dataset::with_root(&["01"]);
    fs_err::remove_file(ds.root.join("dataset_description.json")).expect("rm");
    ds.mkdir("sub-01");

    let result = scan(&ds);
    let hits: Vec<_> = result
        .issues
        .iter()
        .filter(|i| i.code == IssueCode::MissingDatasetDescription)
        .collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].severity, Severity::Error);
    assert!(hits[0].fixable);
}

#[test]
fn missing_sidecar_points_at_the_data_file() {
    let ds = Dataset::with_root(&["01"]);
    ds.write("sub-01/survey/sub-01_task-x_survey.tsv", "q1\n1\n");

    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM201"]);
    let issue = &result.issues[0];
    assert_eq!(issue.primary_path(), "sub-01/survey/sub-01_task-x_survey.tsv");
    assert!(issue.fixable);
    assert_eq!(
        issue.detail,
        Some(IssueDetail::MissingSidecar {
            schema: "survey".into(),
            expected: "sub-01/survey/sub-01_task-x_survey.json".into(),
        })
    );
}

#[test]
fn malformed_filename_names_expected_pattern() {
    let ds = Dataset::with_root(&["01"]);
    ds.write("sub-01/survey/subject01_task-x_survey.tsv", "q1\n");

    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM101"]);
    assert!(!result.issues[0].fixable);
    assert!(result.issues[0].message.contains("sub-<label>"));
}

#[test]
fn missing_required_field_names_field_and_file_once_per_sidecar() {
    let ds = Dataset::with_root(&["01", "02"]);
    for s in ["01", "02"] {
        ds.write(&format!("sub-{s}/survey/sub-{s}_task-x_survey.tsv"), "q1\n");
    }
    ds.write("task-x_survey.json", r#"{"TaskName": "x", "Items": {}}"#);

    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM301"]);
    let issue = &result.issues[0];
    assert!(issue.message.contains("'Language'"));
    assert!(issue.message.contains("task-x_survey.json"));
    assert_eq!(issue.primary_path(), "task-x_survey.json");
}

#[test]
fn schema_violations_are_reported_separately() {
    let ds = Dataset::with_root(&["01"]);
    ds.write("sub-01/physio/sub-01_task-rest_physio.tsv.gz", "");
    ds.write(
        "sub-01/physio/sub-01_task-rest_physio.json",
        r#"{"SamplingFrequency": "fast", "StartTime": 0, "Columns": ["ecg"]}"#,
    );

    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM302"]);
}

#[test]
fn directory_mismatch_and_unknown_modality() {
    let ds = Dataset::with_root(&["01"]);
    ds.write("sub-01/survey/sub-02_task-x_survey.tsv", "q1\n");
    ds.write("sub-01/mri/anything.nii", "");

    let result = scan(&ds);
    let mut got = codes(&result);
    got.sort();
    assert_eq!(got, vec!["PRISM005", "PRISM102"]);
}

#[test]
fn unlisted_subject_and_missing_participants() {
    let ds = Dataset::with_root(&["01"]);
    ds.mkdir("sub-01");
    ds.mkdir("sub-02");
    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM004"]);
    assert_eq!(result.issues[0].primary_path(), "sub-02");

    fs_err::remove_file(ds.root.join("participants.tsv")).expect("rm");
    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM002"]);
}

#[test]
fn empty_dataset_reports_no_subjects() {
    let ds = Dataset::with_root(&[]);
    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM003"]);
}

#[test]
fn unreadable_sidecar_and_root_file() {
    let ds = Dataset::with_root(&["01"]);
    ds.write("dataset_description.json", "{ truncated");
    ds.write("sub-01/survey/sub-01_task-x_survey.tsv", "q1\n");
    ds.write("sub-01/survey/sub-01_task-x_survey.json", "{\"TaskName\": ");

    let result = scan(&ds);
    assert_eq!(codes(&result), vec!["PRISM006", "PRISM202"]);
}

#[test]
fn results_are_independent_of_worker_count() {
    let ds = Dataset::with_root(&["01", "02", "03", "04"]);
    for s in ["01", "02", "03", "04"] {
        ds.write(&format!("sub-{s}/survey/sub-{s}_task-x_survey.tsv"), "q1\n");
        ds.write(&format!("sub-{s}/physio/sub-{s}_task-x_run-a_physio.tsv"), "");
    }
    let one = scan_with(&ds, CancelToken::new(), 1);
    let four = scan_with(&ds, CancelToken::new(), 4);
    assert_eq!(one.issues, four.issues);
}

#[test]
fn cancelled_run_is_marked_incomplete() {
    let ds = Dataset::with_root(&["01"]);
    ds.write("sub-01/survey/sub-01_task-x_survey.tsv", "q1\n");
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = scan_with(&ds, cancel, 1);
    assert!(result.incomplete);
    assert_eq!(codes(&result), vec!["PRISM905"]);
}
