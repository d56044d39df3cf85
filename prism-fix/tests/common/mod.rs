#![allow(dead_code)]

use camino::Utf8PathBuf;
use fs_err as fs;
use prism_domain::{FsDatasetView, Validator};
use prism_fix::FixPlanner;
use prism_schema::SchemaRegistry;
use prism_types::fix::FixAction;
use prism_types::scan::DatasetScanResult;
use tempfile::TempDir;

pub struct Dataset {
    _tmp: TempDir,
    pub root: Utf8PathBuf,
}

impl Dataset {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path");
        Self { _tmp: tmp, root }
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).expect("read")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).is_file()
    }
}

pub fn scan(root: &Utf8PathBuf) -> DatasetScanResult {
    let registry = SchemaRegistry::new();
    let spec = registry.load("stable").expect("schemas");
    let view = FsDatasetView::new(root.clone());
    let mut result = DatasetScanResult::new(root.clone(), spec.id());
    Validator::new(&view, &spec).with_jobs(2).run(&mut result);
    result
}

pub fn plan(root: &Utf8PathBuf) -> (DatasetScanResult, Vec<FixAction>) {
    let registry = SchemaRegistry::new();
    let spec = registry.load("stable").expect("schemas");
    let view = FsDatasetView::new(root.clone());
    let result = scan(root);
    let actions = FixPlanner::new(&view, &spec).plan(&result.issues);
    (result, actions)
}
