//! Sidecar lookup under the inheritance principle.
//!
//! Candidates run from most to least specific. The first one that exists wins
//! and is the only file read: a more specific sidecar shadows a less specific
//! one, values are never merged across levels.

use crate::grammar::{self, Entity, EntityMatch};
use crate::ports::DatasetView;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarLoad {
    Loaded(Map<String, Value>),
    /// The resolved file exists but is unreadable, truncated or not an object.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SidecarResolution {
    pub data_file: Utf8PathBuf,
    /// Every candidate, in the order tried.
    pub candidates: Vec<Utf8PathBuf>,
    pub resolved: Option<Utf8PathBuf>,
    pub load: Option<SidecarLoad>,
    /// Which file contributed each key. With no merging this is always the
    /// resolved file.
    pub provenance: BTreeMap<String, Utf8PathBuf>,
}

impl SidecarResolution {
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        match &self.load {
            Some(SidecarLoad::Loaded(map)) => Some(map),
            _ => None,
        }
    }

    /// Where a missing sidecar should be created.
    pub fn expected(&self) -> Option<&Utf8Path> {
        self.candidates.first().map(Utf8PathBuf::as_path)
    }
}

pub struct SidecarResolver<'a> {
    view: &'a dyn DatasetView,
}

impl<'a> SidecarResolver<'a> {
    pub fn new(view: &'a dyn DatasetView) -> Self {
        Self { view }
    }

    /// Candidate sidecar paths for a data file, relative to the dataset root.
    ///
    /// `data_file` must be `sub-<l>/[ses-<l>/]<modality>/<name>`.
    pub fn candidates(&self, data_file: &Utf8Path, m: &EntityMatch) -> Vec<Utf8PathBuf> {
        let data_dir = data_file.parent().unwrap_or(Utf8Path::new(""));
        let mut out: Vec<Utf8PathBuf> = Vec::new();
        let mut push = |p: Utf8PathBuf| {
            if !out.contains(&p) {
                out.push(p);
            }
        };

        push(data_dir.join(format!("{}.json", m.stem())));

        let without_run: Vec<Entity> = m
            .entities
            .iter()
            .map(|(e, _)| *e)
            .filter(|e| *e != Entity::Run)
            .collect();
        push(data_dir.join(format!("{}.json", m.stem_with(&without_run))));

        let subject_dir = m
            .subject()
            .map(|s| Utf8PathBuf::from(format!("sub-{s}")))
            .unwrap_or_default();
        if let Some(ses) = m.session() {
            let ses_dir = subject_dir.join(format!("ses-{ses}"));
            let stem =
                m.stem_with(&[Entity::Subject, Entity::Session, Entity::Task, Entity::Acquisition]);
            push(ses_dir.join(format!("{stem}.json")));
        }
        let stem = m.stem_with(&[Entity::Subject, Entity::Task, Entity::Acquisition]);
        push(subject_dir.join(format!("{stem}.json")));

        let pooled = format!(
            "{}.json",
            m.stem_with(&[Entity::Task, Entity::Acquisition])
        );
        push(Utf8PathBuf::from(&pooled));
        push(Utf8PathBuf::from(&m.modality).join(&pooled));

        out
    }

    /// First existing candidate, without reading it.
    pub fn locate(
        &self,
        data_file: &Utf8Path,
        m: &EntityMatch,
    ) -> (Vec<Utf8PathBuf>, Option<Utf8PathBuf>) {
        let candidates = self.candidates(data_file, m);
        let found = candidates.iter().find(|c| self.view.exists(c)).cloned();
        (candidates, found)
    }

    /// Resolve and load the sidecar for `data_file`. The modality is the name
    /// of the enclosing directory.
    pub fn resolve(&self, data_file: &Utf8Path) -> SidecarResolution {
        let modality = data_file
            .parent()
            .and_then(Utf8Path::file_name)
            .unwrap_or_default();
        let name = data_file.file_name().unwrap_or_default();
        match grammar::parse(name, modality) {
            Ok(m) => self.resolve_parsed(data_file, &m),
            Err(_) => {
                let exact = match name.find('.') {
                    Some(dot) => data_file.with_file_name(format!("{}.json", &name[..dot])),
                    None => data_file.with_extension("json"),
                };
                let resolved = self.view.exists(&exact).then(|| exact.clone());
                self.finish(data_file, vec![exact], resolved)
            }
        }
    }

    pub fn resolve_parsed(&self, data_file: &Utf8Path, m: &EntityMatch) -> SidecarResolution {
        let (candidates, resolved) = self.locate(data_file, m);
        self.finish(data_file, candidates, resolved)
    }

    /// Read and parse one sidecar file.
    pub fn load(&self, sidecar: &Utf8Path) -> SidecarLoad {
        let text = match self.view.read_to_string(sidecar) {
            Ok(t) => t,
            Err(e) => return SidecarLoad::Unreadable(format!("{e:#}")),
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => SidecarLoad::Loaded(map),
            Ok(other) => SidecarLoad::Unreadable(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            )),
            Err(e) => SidecarLoad::Unreadable(format!("invalid JSON: {e}")),
        }
    }

    fn finish(
        &self,
        data_file: &Utf8Path,
        candidates: Vec<Utf8PathBuf>,
        resolved: Option<Utf8PathBuf>,
    ) -> SidecarResolution {
        let load = resolved.as_deref().map(|p| self.load(p));
        let provenance = match (&load, &resolved) {
            (Some(SidecarLoad::Loaded(map)), Some(path)) => {
                map.keys().map(|k| (k.clone(), path.clone())).collect()
            }
            _ => BTreeMap::new(),
        };
        SidecarResolution {
            data_file: data_file.to_path_buf(),
            candidates,
            resolved,
            load,
            provenance,
        }
    }
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
