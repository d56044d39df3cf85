//! Configuration file loading for prism.
//!
//! Discovers and loads `prism.toml` from the dataset root.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use prism_core::settings::{DEFAULT_PLUGIN_DIR, ExternalSettings};
use prism_core::{FixSettings, ValidateSettings};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "prism.toml";

/// Top-level configuration from prism.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrismConfig {
    pub validation: ValidationConfig,
    pub plugins: PluginsConfig,
    pub external: ExternalConfig,
    pub fix: FixConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Schema version or alias (`stable`).
    pub schema_version: Option<String>,

    /// Extra schema versions, `<dir>/<version>/<name>.schema.json`.
    pub schema_dir: Option<Utf8PathBuf>,

    /// Per-subject workers; 0 or absent lets the pool decide.
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub enabled: bool,

    /// Manifest directory, relative to the dataset root.
    pub dir: Utf8PathBuf,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: Utf8PathBuf::from(DEFAULT_PLUGIN_DIR),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub enabled: bool,

    /// Defaults to `bids-validator --json`.
    pub command: Option<Vec<String>>,

    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    /// Code globs allowed to be fixed (empty = all).
    pub allow: Vec<String>,

    /// Code globs never fixed.
    pub deny: Vec<String>,
}

/// Returns `None` if the dataset has no config file.
pub fn discover_config(dataset_root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = dataset_root.join(CONFIG_FILE_NAME);
    if config_path.is_file() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

pub fn load_config(path: &Utf8Path) -> anyhow::Result<PrismConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<PrismConfig> {
    let config: PrismConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from the dataset root, or return default if not found.
pub fn load_or_default(dataset_root: &Utf8Path) -> anyhow::Result<PrismConfig> {
    match discover_config(dataset_root) {
        Some(path) => load_config(&path),
        None => Ok(PrismConfig::default()),
    }
}

/// Flag values that override the config file. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ValidateOverrides {
    pub schema_version: Option<String>,
    pub schema_dir: Option<Utf8PathBuf>,
    pub jobs: Option<usize>,
    pub no_plugins: bool,
    pub plugin_dir: Option<Utf8PathBuf>,
    /// `Some(true)` for `--external`, `Some(false)` for `--no-external`.
    pub external: Option<bool>,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: PrismConfig,
}

impl ConfigMerger {
    pub fn new(config: PrismConfig) -> Self {
        Self { config }
    }

    /// Scalars from the CLI replace file values; `schema_dir` from the file is
    /// resolved against the dataset root.
    pub fn merge_validate_args(
        &self,
        dataset_root: &Utf8Path,
        cli: &ValidateOverrides,
    ) -> ValidateSettings {
        let file = &self.config;
        let defaults = ValidateSettings::for_dataset(dataset_root);

        let schema_dir = cli.schema_dir.clone().or_else(|| {
            file.validation.schema_dir.as_ref().map(|d| {
                if d.is_absolute() {
                    d.clone()
                } else {
                    dataset_root.join(d)
                }
            })
        });

        let external_enabled = cli.external.unwrap_or(file.external.enabled);
        let external = external_enabled.then(|| {
            let base = ExternalSettings::default();
            ExternalSettings {
                command: file
                    .external
                    .command
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or(base.command),
                timeout: file
                    .external
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(base.timeout),
            }
        });

        ValidateSettings {
            schema_version: cli
                .schema_version
                .clone()
                .or_else(|| file.validation.schema_version.clone())
                .unwrap_or(defaults.schema_version.clone()),
            schema_dir,
            jobs: cli.jobs.or(file.validation.jobs).unwrap_or(0),
            plugins_enabled: file.plugins.enabled && !cli.no_plugins,
            plugin_dir: cli
                .plugin_dir
                .clone()
                .unwrap_or_else(|| file.plugins.dir.clone()),
            external,
            ..defaults
        }
    }

    /// CLI `allow` and `deny` lists extend the config file lists.
    pub fn merge_fix_args(
        &self,
        validate: ValidateSettings,
        dry_run: bool,
        cli_allow: &[String],
        cli_deny: &[String],
    ) -> FixSettings {
        let mut allow = self.config.fix.allow.clone();
        let mut deny = self.config.fix.deny.clone();
        for pattern in cli_allow {
            if !allow.contains(pattern) {
                allow.push(pattern.clone());
            }
        }
        for pattern in cli_deny {
            if !deny.contains(pattern) {
                deny.push(pattern.clone());
            }
        }
        FixSettings {
            validate,
            dry_run,
            allow,
            deny,
            ..FixSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_full_config() {
        let contents = r#"
[validation]
schema_version = "1.0.0"
schema_dir = "schemas"
jobs = 4

[plugins]
enabled = false
dir = "checks"

[external]
enabled = true
command = ["npx", "bids-validator", "--json"]
timeout_secs = 60

[fix]
allow = ["PRISM2*"]
deny = ["PRISM201"]
"#;
        let config = parse_config(contents).expect("parse");
        assert_eq!(config.validation.schema_version.as_deref(), Some("1.0.0"));
        assert_eq!(config.validation.jobs, Some(4));
        assert!(!config.plugins.enabled);
        assert_eq!(config.plugins.dir, Utf8PathBuf::from("checks"));
        assert!(config.external.enabled);
        assert_eq!(config.external.timeout_secs, Some(60));
        assert_eq!(config.fix.allow, vec!["PRISM2*"]);
        assert_eq!(config.fix.deny, vec!["PRISM201"]);
    }

    #[test]
    fn parse_empty_config() {
        let config = parse_config("").expect("parse");
        assert!(config.plugins.enabled);
        assert_eq!(config.plugins.dir, Utf8PathBuf::from(".prism/validators"));
        assert!(!config.external.enabled);
        assert!(config.fix.allow.is_empty());
    }

    #[test]
    fn parse_rejects_bad_toml() {
        assert!(parse_config("[validation\n").is_err());
        assert!(parse_config("[validation]\njobs = \"many\"\n").is_err());
    }

    #[test]
    fn cli_overrides_file() {
        let config = parse_config(
            "[validation]\nschema_version = \"1.0.0\"\njobs = 4\nschema_dir = \"s\"\n[external]\nenabled = true\n",
        )
        .expect("parse");
        let merger = ConfigMerger::new(config);
        let root = Utf8Path::new("/data/study");

        let from_file = merger.merge_validate_args(root, &ValidateOverrides::default());
        assert_eq!(from_file.schema_version, "1.0.0");
        assert_eq!(from_file.jobs, 4);
        assert_eq!(from_file.schema_dir, Some(Utf8PathBuf::from("/data/study/s")));
        let ext = from_file.external.expect("external enabled");
        assert_eq!(ext.command, vec!["bids-validator", "--json"]);
        assert_eq!(ext.timeout, Duration::from_secs(300));

        let from_cli = merger.merge_validate_args(
            root,
            &ValidateOverrides {
                schema_version: Some("stable".into()),
                jobs: Some(1),
                no_plugins: true,
                external: Some(false),
                ..ValidateOverrides::default()
            },
        );
        assert_eq!(from_cli.schema_version, "stable");
        assert_eq!(from_cli.jobs, 1);
        assert!(!from_cli.plugins_enabled);
        assert!(from_cli.external.is_none());
    }

    #[test]
    fn fix_lists_extend_without_duplicates() {
        let config = parse_config("[fix]\nallow = [\"PRISM0*\"]\ndeny = [\"PRISM004\"]\n")
            .expect("parse");
        let merger = ConfigMerger::new(config);
        let v = merger.merge_validate_args(Utf8Path::new("."), &ValidateOverrides::default());
        let fix = merger.merge_fix_args(
            v,
            true,
            &["PRISM0*".to_string(), "PRISM2*".to_string()],
            &["PRISM301".to_string()],
        );
        assert!(fix.dry_run);
        assert_eq!(fix.allow, vec!["PRISM0*", "PRISM2*"]);
        assert_eq!(fix.deny, vec!["PRISM004", "PRISM301"]);
    }
}
