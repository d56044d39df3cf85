use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use glob::glob;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// `<dataset>/.prism/validators/<name>.toml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    #[serde(default)]
    pub name: Option<String>,

    /// Program and leading arguments. The dataset path is appended.
    pub command: Vec<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "enabled_default")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub path: Utf8PathBuf,
    /// Manifest file stem, used when the manifest has no `name`.
    pub stem: String,
    pub manifest: Result<PluginManifest, PluginLoadError>,
}

impl DiscoveredPlugin {
    pub fn name(&self) -> &str {
        self.manifest
            .as_ref()
            .ok()
            .and_then(|m| m.name.as_deref())
            .unwrap_or(&self.stem)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginLoadError {
    #[error("io error: {message}")]
    Io { message: String },

    #[error("toml parse error: {message}")]
    Toml { message: String },

    #[error("manifest has an empty command")]
    EmptyCommand,
}

/// Every `*.toml` under `dir`, sorted by path. A missing directory yields none;
/// a bad manifest yields an entry with an error, never a failure for the rest.
pub fn discover_manifests(dir: &Utf8Path) -> anyhow::Result<Vec<DiscoveredPlugin>> {
    let pattern = dir.join("*.toml");
    let pattern_str = pattern.as_str();

    debug!(pattern = %pattern_str, "scanning for plugin manifests");

    let mut out = Vec::new();
    for entry in glob(pattern_str).context("glob plugin manifests")? {
        let path = entry
            .map_err(|e| anyhow::anyhow!("glob error: {e}"))?
            .to_string_lossy()
            .to_string();
        let path = Utf8PathBuf::from(path);
        let stem = path.file_stem().unwrap_or("plugin").to_string();

        let manifest = match fs::read_to_string(&path) {
            Ok(s) => toml::from_str::<PluginManifest>(&s)
                .map_err(|e| PluginLoadError::Toml {
                    message: e.to_string(),
                })
                .and_then(|m| {
                    if m.command.first().is_none_or(|p| p.trim().is_empty()) {
                        Err(PluginLoadError::EmptyCommand)
                    } else {
                        Ok(m)
                    }
                }),
            Err(e) => Err(PluginLoadError::Io {
                message: e.to_string(),
            }),
        };

        out.push(DiscoveredPlugin {
            path,
            stem,
            manifest,
        });
    }

    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}
