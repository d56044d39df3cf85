//! Clap-free settings for the validate and fix pipelines.

use camino::{Utf8Path, Utf8PathBuf};
use prism_fix::DEFAULT_LOCK_TIMEOUT;
use std::time::Duration;

/// Project-local plugin directory, relative to the dataset root.
pub const DEFAULT_PLUGIN_DIR: &str = ".prism/validators";

/// How long a scan waits for a concurrent fix to release its lock.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Optional delegation to an external standards validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSettings {
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl Default for ExternalSettings {
    fn default() -> Self {
        Self {
            command: prism_external::DEFAULT_COMMAND
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Settings for the validate pipeline.
#[derive(Debug, Clone)]
pub struct ValidateSettings {
    pub dataset_root: Utf8PathBuf,

    // Schemas
    pub schema_version: String,
    pub schema_dir: Option<Utf8PathBuf>,

    /// Per-subject workers; `0` lets the pool decide.
    pub jobs: usize,

    // Plugins
    pub plugins_enabled: bool,
    /// Relative paths resolve against the dataset root.
    pub plugin_dir: Utf8PathBuf,

    /// `None` disables the external pass.
    pub external: Option<ExternalSettings>,

    pub lock_wait: Duration,
}

impl Default for ValidateSettings {
    fn default() -> Self {
        Self {
            dataset_root: Utf8PathBuf::from("."),
            schema_version: prism_schema::STABLE_ALIAS.to_string(),
            schema_dir: None,
            jobs: 0,
            plugins_enabled: true,
            plugin_dir: Utf8PathBuf::from(DEFAULT_PLUGIN_DIR),
            external: None,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }
}

impl ValidateSettings {
    pub fn for_dataset(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dataset_root: root.into(),
            ..Self::default()
        }
    }

    pub fn plugin_dir_abs(&self) -> Utf8PathBuf {
        abs_path(&self.dataset_root, &self.plugin_dir)
    }
}

/// Settings for the fix pipeline.
#[derive(Debug, Clone)]
pub struct FixSettings {
    pub validate: ValidateSettings,

    pub dry_run: bool,

    // Policy
    pub allow: Vec<String>,
    pub deny: Vec<String>,

    pub lock_timeout: Duration,
}

impl Default for FixSettings {
    fn default() -> Self {
        Self {
            validate: ValidateSettings::default(),
            dry_run: false,
            allow: Vec::new(),
            deny: Vec::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

fn abs_path(root: &Utf8Path, rel: &Utf8Path) -> Utf8PathBuf {
    if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        root.join(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_dir_resolves_against_dataset() {
        let s = ValidateSettings::for_dataset("/data/study");
        assert_eq!(s.plugin_dir_abs(), Utf8PathBuf::from("/data/study/.prism/validators"));

        let s = ValidateSettings {
            plugin_dir: "/opt/prism/plugins".into(),
            ..ValidateSettings::for_dataset("/data/study")
        };
        assert_eq!(s.plugin_dir_abs(), Utf8PathBuf::from("/opt/prism/plugins"));
    }

    #[test]
    fn defaults_are_conservative() {
        let s = ValidateSettings::default();
        assert_eq!(s.schema_version, "stable");
        assert!(s.external.is_none());
        assert!(s.plugins_enabled);
        assert!(!FixSettings::default().dry_run);
    }
}
