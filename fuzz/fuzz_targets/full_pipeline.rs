#![no_main]

//! Fuzz target for validate -> plan -> apply -> plan.
//!
//! Builds a small dataset from structured input, then checks that a second
//! plan over the fixed dataset is empty.

use camino::Utf8PathBuf;
use libfuzzer_sys::fuzz_target;
use prism_domain::{FsDatasetView, Validator};
use prism_fix::{ApplyOptions, FixPlanner, apply};
use prism_schema::SchemaRegistry;
use prism_types::scan::DatasetScanResult;

#[derive(Debug, arbitrary::Arbitrary)]
struct DatasetInput {
    description: Option<Vec<u8>>,
    participants: Option<String>,
    files: Vec<FileInput>,
}

#[derive(Debug, arbitrary::Arbitrary)]
struct FileInput {
    subject: u8,
    modality: ModalityChoice,
    name: String,
    sidecar: Option<Vec<u8>>,
}

#[derive(Debug, arbitrary::Arbitrary)]
enum ModalityChoice {
    Survey,
    Biometrics,
    Physio,
    Eyetracking,
    Other,
}

impl ModalityChoice {
    fn dir(&self) -> &'static str {
        match self {
            ModalityChoice::Survey => "survey",
            ModalityChoice::Biometrics => "biometrics",
            ModalityChoice::Physio => "physio",
            ModalityChoice::Eyetracking => "eyetracking",
            ModalityChoice::Other => "notes",
        }
    }
}

fn safe_name(name: &str) -> Option<String> {
    let name: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .take(64)
        .collect();
    (!name.is_empty() && !name.starts_with('.')).then_some(name)
}

fn scan(
    root: &Utf8PathBuf,
    registry: &SchemaRegistry,
) -> Option<(DatasetScanResult, Vec<prism_types::fix::FixAction>)> {
    let spec = registry.load("stable").ok()?;
    let view = FsDatasetView::new(root.clone());
    let mut result = DatasetScanResult::new(root.clone(), spec.id());
    Validator::new(&view, &spec).with_jobs(1).run(&mut result);
    let actions = FixPlanner::new(&view, &spec).plan(&result.issues);
    Some((result, actions))
}

fuzz_target!(|input: DatasetInput| {
    let Ok(td) = tempfile::tempdir() else {
        return;
    };
    let Ok(root) = Utf8PathBuf::from_path_buf(td.path().to_path_buf()) else {
        return;
    };

    if let Some(desc) = &input.description {
        let _ = std::fs::write(root.join("dataset_description.json"), desc);
    }
    if let Some(p) = &input.participants {
        let _ = std::fs::write(root.join("participants.tsv"), p);
    }
    for f in input.files.iter().take(8) {
        let Some(name) = safe_name(&f.name) else {
            continue;
        };
        let dir = root.join(format!("sub-{:02}", f.subject % 4)).join(f.modality.dir());
        if std::fs::create_dir_all(&dir).is_err() {
            continue;
        }
        let data = dir.join(&name);
        if data.as_str().ends_with(".json") {
            continue;
        }
        let _ = std::fs::write(&data, "q1\n1\n");
        if let Some(sidecar) = &f.sidecar {
            let _ = std::fs::write(data.with_extension("json"), sidecar);
        }
    }

    let registry = SchemaRegistry::new();
    let Some((_, actions)) = scan(&root, &registry) else {
        return;
    };
    let Ok(report) = apply(&root, &actions, &ApplyOptions::default()) else {
        return;
    };
    if report.summary.failed > 0 {
        // Unparsable targets are left alone, so the plan may legitimately repeat.
        return;
    }
    let Some((_, again)) = scan(&root, &registry) else {
        return;
    };
    assert!(again.is_empty(), "plan not idempotent: {again:?}");
});
