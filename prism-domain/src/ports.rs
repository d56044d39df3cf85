use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read-only dataset access. Paths are relative to [`DatasetView::root`].
///
/// Shared across the per-subject worker pool, hence `Sync`.
pub trait DatasetView: Send + Sync {
    fn root(&self) -> &Utf8Path;

    fn read_to_string(&self, rel: &Utf8Path) -> anyhow::Result<String>;

    fn exists(&self, rel: &Utf8Path) -> bool;

    fn is_dir(&self, rel: &Utf8Path) -> bool;

    /// Entries sorted by name. Non-UTF-8 names are skipped.
    fn list_dir(&self, rel: &Utf8Path) -> anyhow::Result<Vec<DirEntry>>;
}

/// File-system backed `DatasetView`.
#[derive(Debug, Clone)]
pub struct FsDatasetView {
    root: Utf8PathBuf,
}

impl FsDatasetView {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn abs(&self, rel: &Utf8Path) -> Utf8PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(rel)
        }
    }
}

impl DatasetView for FsDatasetView {
    fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn read_to_string(&self, rel: &Utf8Path) -> anyhow::Result<String> {
        let abs = self.abs(rel);
        fs::read_to_string(&abs).with_context(|| format!("read {}", abs))
    }

    fn exists(&self, rel: &Utf8Path) -> bool {
        self.abs(rel).is_file()
    }

    fn is_dir(&self, rel: &Utf8Path) -> bool {
        self.abs(rel).is_dir()
    }

    fn list_dir(&self, rel: &Utf8Path) -> anyhow::Result<Vec<DirEntry>> {
        let abs = self.abs(rel);
        let mut out = Vec::new();
        for entry in fs::read_dir(&abs)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            out.push(DirEntry { name, is_dir });
        }
        out.sort();
        Ok(out)
    }
}
