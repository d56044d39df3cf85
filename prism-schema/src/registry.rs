use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::compiled::CompiledSchema;
use crate::error::ConfigurationError;

/// Alias that always names the newest bundled version.
pub const STABLE_ALIAS: &str = "stable";

/// Schema name for the root `dataset_description.json`.
pub const DATASET_DESCRIPTION: &str = "dataset_description";

const STABLE_VERSION: &str = "1.0.0";

const BUNDLED: &[(&str, &[(&str, &str)])] = &[(
    "1.0.0",
    &[
        (
            "dataset_description",
            include_str!("../schemas/1.0.0/dataset_description.schema.json"),
        ),
        ("survey", include_str!("../schemas/1.0.0/survey.schema.json")),
        (
            "biometrics",
            include_str!("../schemas/1.0.0/biometrics.schema.json"),
        ),
        ("physio", include_str!("../schemas/1.0.0/physio.schema.json")),
        (
            "eyetracking",
            include_str!("../schemas/1.0.0/eyetracking.schema.json"),
        ),
    ],
)];

/// One immutable schema set.
#[derive(Debug)]
pub struct SpecVersion {
    id: String,
    schemas: BTreeMap<String, Arc<CompiledSchema>>,
}

impl SpecVersion {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self, name: &str) -> Option<&Arc<CompiledSchema>> {
        self.schemas.get(name)
    }

    pub fn dataset_description(&self) -> Option<&Arc<CompiledSchema>> {
        self.schema(DATASET_DESCRIPTION)
    }

    /// Modality names covered by this version (excludes root-file schemas).
    pub fn modalities(&self) -> impl Iterator<Item = &str> {
        self.schemas
            .keys()
            .map(String::as_str)
            .filter(|k| *k != DATASET_DESCRIPTION)
    }
}

/// Loads and caches schema versions. One instance per run, shared by reference.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schema_dir: Option<Utf8PathBuf>,
    cache: RwLock<BTreeMap<String, Arc<SpecVersion>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additional versions live under `<dir>/<version>/<name>.schema.json`
    /// and take precedence over bundled ones with the same version id.
    pub fn with_schema_dir(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            schema_dir: Some(dir.into()),
            cache: RwLock::default(),
        }
    }

    pub fn schema_dir(&self) -> Option<&Utf8Path> {
        self.schema_dir.as_deref()
    }

    pub fn resolve_alias(&self, name: &str) -> String {
        let name = name.trim();
        if name.eq_ignore_ascii_case(STABLE_ALIAS) || name.is_empty() {
            STABLE_VERSION.to_string()
        } else {
            name.trim_start_matches('v').to_string()
        }
    }

    /// Every version this registry can load, sorted.
    pub fn available_versions(&self) -> Vec<String> {
        let mut out: Vec<String> = BUNDLED.iter().map(|(v, _)| v.to_string()).collect();
        if let Some(dir) = &self.schema_dir
            && let Ok(entries) = fs::read_dir(dir)
        {
            for entry in entries.flatten() {
                if entry.path().is_dir()
                    && let Some(name) = entry.file_name().to_str()
                {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }

    pub fn load(&self, version: &str) -> Result<Arc<SpecVersion>, ConfigurationError> {
        let id = self.resolve_alias(version);

        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
        {
            return Ok(hit.clone());
        }

        let sources = self.sources_for(&id)?;
        if sources.is_empty() {
            return Err(ConfigurationError::UnknownVersion {
                version: version.to_string(),
                available: self.available_versions(),
            });
        }

        let mut schemas = BTreeMap::new();
        for (name, text) in sources {
            let raw: Value =
                serde_json::from_str(&text).map_err(|source| ConfigurationError::SchemaParse {
                    version: id.clone(),
                    name: name.clone(),
                    source,
                })?;
            let compiled = CompiledSchema::compile(&id, &name, raw)?;
            debug!(
                version = %id,
                schema = %name,
                required = compiled.required().len(),
                "compiled schema"
            );
            schemas.insert(name, Arc::new(compiled));
        }

        let loaded = Arc::new(SpecVersion {
            id: id.clone(),
            schemas,
        });
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        Ok(cache.entry(id).or_insert(loaded).clone())
    }

    pub fn schema_for(
        &self,
        modality: &str,
        version: &str,
    ) -> Result<Option<Arc<CompiledSchema>>, ConfigurationError> {
        Ok(self.load(version)?.schema(modality).cloned())
    }

    fn sources_for(&self, id: &str) -> Result<BTreeMap<String, String>, ConfigurationError> {
        let mut out: BTreeMap<String, String> = BTreeMap::new();
        if let Some((_, files)) = BUNDLED.iter().find(|(v, _)| *v == id) {
            for (name, text) in *files {
                out.insert(name.to_string(), text.to_string());
            }
        }

        let Some(dir) = &self.schema_dir else {
            return Ok(out);
        };
        let version_dir = dir.join(id);
        if !version_dir.is_dir() {
            return Ok(out);
        }

        let dir_err = |e: std::io::Error| ConfigurationError::SchemaDir {
            path: version_dir.clone(),
            message: e.to_string(),
        };
        for entry in fs::read_dir(&version_dir).map_err(dir_err)? {
            let entry = entry.map_err(dir_err)?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(".schema.json") else {
                continue;
            };
            let text = fs::read_to_string(entry.path()).map_err(dir_err)?;
            debug!(version = %id, schema = %name, "schema from directory");
            out.insert(name.to_string(), text);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_alias_resolves_to_bundled_version() {
        let reg = SchemaRegistry::new();
        assert_eq!(reg.resolve_alias("stable"), "1.0.0");
        assert_eq!(reg.resolve_alias("v1.0.0"), "1.0.0");
        let spec = reg.load("stable").expect("load");
        assert_eq!(spec.id(), "1.0.0");
    }

    #[test]
    fn bundled_version_covers_all_modalities() {
        let spec = SchemaRegistry::new().load("1.0.0").expect("load");
        let modalities: Vec<&str> = spec.modalities().collect();
        assert_eq!(modalities, vec!["biometrics", "eyetracking", "physio", "survey"]);
        assert!(spec.dataset_description().is_some());
    }

    #[test]
    fn load_is_cached() {
        let reg = SchemaRegistry::new();
        let a = reg.load("1.0.0").expect("load");
        let b = reg.load("stable").expect("load");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_version_is_configuration_error() {
        let err = SchemaRegistry::new().load("9.9.9").expect_err("unknown");
        assert!(err.is_unknown_version());
        assert!(err.to_string().contains("1.0.0"));
    }
}
