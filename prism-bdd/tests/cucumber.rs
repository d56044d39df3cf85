use camino::Utf8PathBuf;
use cucumber::{World, given, then, when};
use fs_err as fs;
use prism_core::{
    CancelToken, FixOutcome, FixSettings, PluginRegistry, RunError, SchemaRegistry,
    ValidateSettings, run_fix, run_validate,
};
use prism_types::issue::{Issue, Severity};
use prism_types::scan::DatasetScanResult;
use tempfile::TempDir;

const SURVEY_DATA: &str = "sub-01/survey/sub-01_task-x_survey.tsv";
const SURVEY_SIDECAR: &str = "sub-01/survey/sub-01_task-x_survey.json";

#[derive(Debug, Default, World)]
pub struct PrismWorld {
    temp: Option<TempDir>,
    root: Option<Utf8PathBuf>,
    result: Option<DatasetScanResult>,
    config_error: Option<String>,
    fixes: Vec<FixOutcome>,
}

impl PrismWorld {
    fn root(&self) -> &Utf8PathBuf {
        self.root.as_ref().expect("dataset root set")
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
    }

    fn result(&self) -> &DatasetScanResult {
        self.result.as_ref().expect("validation ran")
    }

    fn issues_with(&self, code: &str) -> Vec<&Issue> {
        self.result()
            .issues
            .iter()
            .filter(|i| i.code.as_str() == code)
            .collect()
    }

    fn only_issue(&self, code: &str) -> &Issue {
        let hits = self.issues_with(code);
        assert_eq!(hits.len(), 1, "expected one {code}, got {:?}", self.result().issues);
        hits[0]
    }

    fn validate(&mut self, schema_version: &str, plugins: PluginRegistry) {
        let settings = ValidateSettings {
            schema_version: schema_version.to_string(),
            ..ValidateSettings::for_dataset(self.root().clone())
        };
        match run_validate(&settings, &SchemaRegistry::new(), plugins, &CancelToken::new()) {
            Ok(result) => {
                self.result = Some(result);
                self.config_error = None;
            }
            Err(RunError::Configuration(e)) => {
                self.result = None;
                self.config_error = Some(e.to_string());
            }
            Err(e) => panic!("validation failed: {e}"),
        }
    }
}

#[given("a dataset with one survey subject")]
async fn dataset_with_one_subject(world: &mut PrismWorld) {
    let td = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).expect("utf8");
    world.temp = Some(td);
    world.root = Some(root);

    world.write(
        "dataset_description.json",
        r#"{"Name": "Study", "BIDSVersion": "1.8.0", "DatasetType": "raw"}"#,
    );
    world.write("participants.tsv", "participant_id\nsub-01\n");
    world.write(SURVEY_DATA, "q1\tq2\n1\t2\n");
    world.write(
        SURVEY_SIDECAR,
        r#"{"TaskName": "x", "Language": "en", "Items": {"q1": {}, "q2": {}}}"#,
    );
}

#[given("the dataset has no dataset_description.json")]
async fn no_description(world: &mut PrismWorld) {
    fs::remove_file(world.root().join("dataset_description.json")).expect("rm");
}

#[given(expr = "a second survey subject {string} that is not listed")]
async fn unlisted_subject(world: &mut PrismWorld, label: String) {
    let sidecar = format!("sub-{label}/survey/sub-{label}_task-x_survey.json");
    world.write(&format!("sub-{label}/survey/sub-{label}_task-x_survey.tsv"), "q1\n1\n");
    world.write(&sidecar, r#"{"TaskName": "x", "Language": "en", "Items": {}}"#);
}

#[given("the survey sidecar is removed")]
async fn sidecar_removed(world: &mut PrismWorld) {
    fs::remove_file(world.root().join(SURVEY_SIDECAR)).expect("rm");
}

#[given(expr = "the survey sidecar is {string}")]
async fn sidecar_is(world: &mut PrismWorld, body: String) {
    world.write(SURVEY_SIDECAR, &body);
}

#[given(expr = "a file {string}")]
async fn a_file(world: &mut PrismWorld, rel: String) {
    world.write(&rel, "q1\n1\n");
}

#[when("I validate the dataset")]
async fn validate(world: &mut PrismWorld) {
    world.validate("stable", PluginRegistry::new());
}

#[when(expr = "I validate the dataset with schema version {string}")]
async fn validate_with_version(world: &mut PrismWorld, version: String) {
    world.validate(&version, PluginRegistry::new());
}

#[when("I validate the dataset with a plugin that always fails")]
async fn validate_with_failing_plugin(world: &mut PrismWorld) {
    let mut plugins = PluginRegistry::new();
    plugins.register_fn("always-fails", |_| anyhow::bail!("this plugin always fails"));
    world.validate("stable", plugins);
}

#[when(regex = r"^I fix the dataset(?: again)?$")]
async fn fix(world: &mut PrismWorld) {
    let settings = FixSettings {
        validate: ValidateSettings::for_dataset(world.root().clone()),
        ..FixSettings::default()
    };
    let outcome =
        run_fix(&settings, &SchemaRegistry::new(), &CancelToken::new()).expect("fix");
    world.fixes.push(outcome);
}

#[then(expr = "there is exactly {int} {string} issue")]
async fn exactly_n(world: &mut PrismWorld, n: usize, code: String) {
    assert_eq!(
        world.issues_with(&code).len(),
        n,
        "issues: {:?}",
        world.result().issues
    );
}

#[then(expr = "there is no {string} issue")]
async fn none_of(world: &mut PrismWorld, code: String) {
    assert!(world.issues_with(&code).is_empty());
}

#[then(expr = "every {string} issue is an ERROR and fixable")]
async fn error_and_fixable(world: &mut PrismWorld, code: String) {
    for issue in world.issues_with(&code) {
        assert_eq!(issue.severity, Severity::Error);
        assert!(issue.fixable);
    }
}

#[then(expr = "the {string} issue is not fixable")]
async fn not_fixable(world: &mut PrismWorld, code: String) {
    assert!(!world.only_issue(&code).fixable);
}

#[then(expr = "the {string} issue points at {string}")]
async fn points_at(world: &mut PrismWorld, code: String, path: String) {
    assert_eq!(world.only_issue(&code).primary_path(), path);
}

#[then(expr = "the {string} issue message mentions {string}")]
async fn message_mentions(world: &mut PrismWorld, code: String, needle: String) {
    let issue = world.only_issue(&code);
    assert!(
        issue.message.contains(&needle),
        "message '{}' lacks '{needle}'",
        issue.message
    );
}

#[then("the dataset has no issues")]
async fn no_issues(world: &mut PrismWorld) {
    assert!(world.result().issues.is_empty(), "{:?}", world.result().issues);
}

#[then(expr = "the file {string} exists")]
async fn file_exists(world: &mut PrismWorld, rel: String) {
    assert!(world.root().join(&rel).is_file(), "{rel} missing");
}

#[then(expr = "the file {string} contains {string}")]
async fn file_contains(world: &mut PrismWorld, rel: String, needle: String) {
    let text = fs::read_to_string(world.root().join(&rel)).expect("read");
    assert!(text.contains(&needle), "{rel}: {text}");
}

#[then(expr = "the JSON file {string} has {string} set to {string}")]
async fn json_field(world: &mut PrismWorld, rel: String, key: String, value: String) {
    let text = fs::read_to_string(world.root().join(&rel)).expect("read");
    let v: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(v[&key], serde_json::Value::String(value));
}

#[then(expr = "the second fix planned {int} actions")]
async fn second_fix_actions(world: &mut PrismWorld, n: usize) {
    let second = world.fixes.get(1).expect("two fix runs");
    assert_eq!(second.actions.len(), n, "{:?}", second.actions);
}

#[then("validation fails with a configuration error")]
async fn config_error(world: &mut PrismWorld) {
    let msg = world.config_error.as_deref().expect("configuration error");
    assert!(msg.contains("9.9.9"), "{msg}");
}

#[then("no issue list is produced")]
async fn no_issue_list(world: &mut PrismWorld) {
    assert!(world.result.is_none());
}

#[tokio::main]
async fn main() {
    let features_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("features");
    PrismWorld::cucumber().run_and_exit(features_path).await;
}
