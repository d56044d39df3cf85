#![allow(dead_code)]

use camino::Utf8PathBuf;
use fs_err as fs;
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

    /// A dataset with valid root files and the given subjects listed.
    pub fn with_root(subjects: &[&str]) -> Self {
        let ds = Self::new();
        ds.write(
            "dataset_description.json",
            r#"{"Name": "Study", "BIDSVersion": "1.8.0", "DatasetType": "raw"}"#,
        );
        let mut tsv = String::from("participant_id\n");
        for s in subjects {
            tsv.push_str(&format!("sub-{s}\n"));
        }
        ds.write("participants.tsv", &tsv);
        ds
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
    }

    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.root.join(rel)).expect("mkdir");
    }
}

pub const SURVEY_SIDECAR: &str = r#"{"TaskName": "x", "Language": "en", "Items": {}}"#;
