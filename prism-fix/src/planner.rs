use camino::{Utf8Path, Utf8PathBuf};
use prism_domain::{DATASET_DESCRIPTION_JSON, DatasetView, PARTICIPANTS_TSV};
use prism_schema::SpecVersion;
use prism_types::fix::{FixAction, FixPayload, FixVerb};
use prism_types::issue::{Issue, IssueCode, IssueDetail};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use uuid::Uuid;

const PARTICIPANT_ID: &str = "participant_id";

/// Codes that have a deterministic remediation.
pub fn list_fixable_codes() -> Vec<IssueCode> {
    IssueCode::fixable_codes()
}

/// Allow/deny code globs (`PRISM2*`, `PRISM30?`). Deny wins; an empty allow
/// list allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl FixPolicy {
    pub fn allows(&self, code: IssueCode) -> Result<(), String> {
        let id = code.as_str();
        if let Some(pat) = self.deny.iter().find(|p| glob_match(p, id)) {
            return Err(format!("denied by policy ({pat})"));
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|p| glob_match(p, id)) {
            return Err("not in allowlist".to_string());
        }
        Ok(())
    }
}

/// Builds fix actions from issues. Reads the dataset (to list subjects) but
/// never writes.
pub struct FixPlanner<'a> {
    view: &'a dyn DatasetView,
    spec: &'a SpecVersion,
}

#[derive(Default)]
struct Groups {
    description: u64,
    participants_missing: u64,
    unlisted: BTreeSet<String>,
    unlisted_count: u64,
    /// expected sidecar → (schema, issue count)
    sidecars: BTreeMap<Utf8PathBuf, (String, u64)>,
    /// sidecar → (schema, fields, issue count)
    fields: BTreeMap<Utf8PathBuf, (String, BTreeSet<String>, u64)>,
}

impl<'a> FixPlanner<'a> {
    pub fn new(view: &'a dyn DatasetView, spec: &'a SpecVersion) -> Self {
        Self { view, spec }
    }

    /// One action per artifact: one CREATE per missing file, one UPDATE per
    /// file however many of its fields or rows are missing. Issues that are not
    /// fixable or carry no usable detail are ignored. Output is sorted by
    /// (target, code) and ids are content-derived.
    pub fn plan(&self, issues: &[Issue]) -> Vec<FixAction> {
        let mut groups = Groups::default();
        for issue in issues.iter().filter(|i| i.fixable) {
            match (issue.code, &issue.detail) {
                (IssueCode::MissingDatasetDescription, _) => groups.description += 1,
                (IssueCode::MissingParticipants, _) => groups.participants_missing += 1,
                (IssueCode::UnlistedSubject, Some(IssueDetail::UnlistedSubject { subject })) => {
                    groups.unlisted.insert(subject.clone());
                    groups.unlisted_count += 1;
                }
                (
                    IssueCode::MissingSidecar,
                    Some(IssueDetail::MissingSidecar { schema, expected }),
                ) => {
                    groups
                        .sidecars
                        .entry(expected.clone())
                        .or_insert_with(|| (schema.clone(), 0))
                        .1 += 1;
                }
                (
                    IssueCode::MissingRequiredField,
                    Some(IssueDetail::MissingField {
                        schema,
                        field,
                        sidecar,
                    }),
                ) => {
                    let entry = groups
                        .fields
                        .entry(sidecar.clone())
                        .or_insert_with(|| (schema.clone(), BTreeSet::new(), 0));
                    entry.1.insert(field.clone());
                    entry.2 += 1;
                }
                (code, _) => {
                    debug!(code = %code, path = issue.primary_path(), "no remediation for issue");
                }
            }
        }

        let mut actions = Vec::new();

        if groups.description > 0 {
            let fields = self
                .spec
                .dataset_description()
                .map(|s| s.required_placeholders())
                .unwrap_or_default();
            actions.push(action(
                IssueCode::MissingDatasetDescription,
                FixVerb::Create,
                DATASET_DESCRIPTION_JSON.into(),
                FixPayload::JsonFields { fields },
                groups.description,
            ));
        }

        if groups.participants_missing > 0 {
            let rows = self
                .subject_dirs()
                .into_iter()
                .map(|s| vec![s])
                .collect();
            actions.push(action(
                IssueCode::MissingParticipants,
                FixVerb::Create,
                PARTICIPANTS_TSV.into(),
                FixPayload::TsvRows {
                    header: vec![PARTICIPANT_ID.to_string()],
                    rows,
                },
                groups.participants_missing,
            ));
        } else if !groups.unlisted.is_empty() {
            actions.push(action(
                IssueCode::UnlistedSubject,
                FixVerb::Update,
                PARTICIPANTS_TSV.into(),
                FixPayload::TsvRows {
                    header: vec![PARTICIPANT_ID.to_string()],
                    rows: groups.unlisted.iter().map(|s| vec![s.clone()]).collect(),
                },
                groups.unlisted_count,
            ));
        }

        for (expected, (schema, count)) in groups.sidecars {
            let fields = self
                .spec
                .schema(&schema)
                .map(|s| s.required_placeholders())
                .unwrap_or_default();
            actions.push(action(
                IssueCode::MissingSidecar,
                FixVerb::Create,
                expected,
                FixPayload::JsonFields { fields },
                count,
            ));
        }

        for (sidecar, (schema, missing, count)) in groups.fields {
            let Some(compiled) = self.spec.schema(&schema) else {
                debug!(schema = %schema, sidecar = %sidecar, "schema gone; skipping field fix");
                continue;
            };
            // Declaration order of the schema, not alphabetical.
            let ordered = compiled
                .required()
                .iter()
                .filter(|k| missing.contains(k.as_str()))
                .map(String::as_str);
            let fields = compiled.placeholders(ordered);
            actions.push(action(
                IssueCode::MissingRequiredField,
                FixVerb::Update,
                sidecar,
                FixPayload::JsonFields { fields },
                count,
            ));
        }

        actions.sort_by(|a, b| (&a.target_path, a.code).cmp(&(&b.target_path, b.code)));
        debug!(actions = actions.len(), "fix plan built");
        actions
    }

    fn subject_dirs(&self) -> Vec<String> {
        self.view
            .list_dir(Utf8Path::new(""))
            .unwrap_or_else(|e| {
                warn!(error = %e, "cannot list dataset root; no subjects seeded");
                Vec::new()
            })
            .into_iter()
            .filter(|e| e.is_dir && e.name.len() > "sub-".len() && e.name.starts_with("sub-"))
            .map(|e| e.name)
            .collect()
    }
}

fn action(
    code: IssueCode,
    verb: FixVerb,
    target_path: Utf8PathBuf,
    payload: FixPayload,
    resolves: u64,
) -> FixAction {
    let id = deterministic_action_id(code, verb, &target_path, &payload).to_string();
    FixAction {
        id,
        code,
        action: verb,
        target_path,
        payload,
        resolves,
    }
}

fn deterministic_action_id(
    code: IssueCode,
    verb: FixVerb,
    target: &Utf8Path,
    payload: &FixPayload,
) -> Uuid {
    // Deterministic ID: v5(namespace, stable_key_bytes)
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x7a, 0x1c, 0x52, 0x0e, 0x93, 0x4f, 0x4d, 0x2b, 0xa6, 0x0d, 0x3e, 0x58, 0x91, 0xc4, 0x17,
        0x6f,
    ]);
    let stable_key = format!(
        "{}|{}|{}|{}",
        code,
        verb,
        target,
        payload_fingerprint(payload)
    );
    Uuid::new_v5(&NAMESPACE, stable_key.as_bytes())
}

fn payload_fingerprint(payload: &FixPayload) -> String {
    let canonical = match payload {
        FixPayload::JsonFields { fields } => canonicalize_json(&Value::Object(fields.clone())),
        FixPayload::TsvRows { header, rows } => {
            serde_json::json!({ "header": header, "rows": rows })
        }
    };
    let s = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                if let Some(v) = map.get(&k) {
                    out.insert(k, canonicalize_json(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

fn glob_match(pat: &str, text: &str) -> bool {
    let p = pat.as_bytes();
    let t = text.as_bytes();
    let mut dp = vec![vec![false; t.len() + 1]; p.len() + 1];
    dp[0][0] = true;

    for i in 1..=p.len() {
        if p[i - 1] == b'*' {
            dp[i][0] = dp[i - 1][0];
        }
    }

    for i in 1..=p.len() {
        for j in 1..=t.len() {
            dp[i][j] = match p[i - 1] {
                b'*' => dp[i - 1][j] || dp[i][j - 1],
                b'?' => dp[i - 1][j - 1],
                c => dp[i - 1][j - 1] && c.eq_ignore_ascii_case(&t[j - 1]),
            };
        }
    }

    dp[p.len()][t.len()]
}
