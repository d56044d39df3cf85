//! Default filesystem-backed port implementations.

use crate::ports::WritePort;
use anyhow::Context;
use camino::Utf8Path;

/// Writes via `std::fs`, creating parent directories as needed.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
        std::fs::write(path, contents).with_context(|| format!("write {}", path))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(path).with_context(|| format!("create_dir_all {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn fs_write_port_creates_parents() {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        let target = root.join("out/nested/report.json");

        let port = FsWritePort;
        port.write_file(&target, b"{}").expect("write");
        assert_eq!(std::fs::read_to_string(&target).expect("read"), "{}");

        let extra = root.join("extra");
        port.create_dir_all(&extra).expect("mkdir");
        assert!(extra.is_dir());
    }
}
