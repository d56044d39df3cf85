use crate::grammar::{self, EntityMatch};
use crate::ports::{DatasetView, DirEntry};
use crate::sidecar::{SidecarLoad, SidecarResolver, json_kind};
use camino::{Utf8Path, Utf8PathBuf};
use prism_schema::{CompiledSchema, DATASET_DESCRIPTION, SpecVersion};
use prism_types::issue::{Issue, IssueCode, IssueDetail};
use prism_types::scan::{DatasetScanResult, Inventory, ScanPhase};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

pub const DATASET_DESCRIPTION_JSON: &str = "dataset_description.json";
pub const PARTICIPANTS_TSV: &str = "participants.tsv";

/// Cooperative cancellation, checked between subjects.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Native validation: root files, per-subject walk, sidecar aggregation.
pub struct Validator<'a> {
    view: &'a dyn DatasetView,
    spec: &'a SpecVersion,
    jobs: usize,
    cancel: CancelToken,
}

/// What one subject contributes before aggregation.
#[derive(Debug, Default)]
struct SubjectScan {
    issues: Vec<Issue>,
    inventory: Inventory,
    /// sidecar → (modality, data files resolving to it)
    sidecars: BTreeMap<Utf8PathBuf, (String, Vec<Utf8PathBuf>)>,
    /// modality directories with a grammar but no schema in this version
    schemaless: BTreeMap<String, Vec<Utf8PathBuf>>,
}

impl<'a> Validator<'a> {
    pub fn new(view: &'a dyn DatasetView, spec: &'a SpecVersion) -> Self {
        Self {
            view,
            spec,
            jobs: 0,
            cancel: CancelToken::default(),
        }
    }

    /// Worker count for the per-subject phase. `0` lets rayon decide.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the Scanning and Aggregating phases into `result`. Native issues
    /// come out sorted by (primary path, code, message).
    pub fn run(&self, result: &mut DatasetScanResult) {
        result.enter(ScanPhase::Scanning);

        let mut issues = Vec::new();
        let subjects = self.subject_labels(&mut issues);
        let participants = self.check_root(&subjects, &mut issues);
        if let Some(listed) = &participants {
            for label in &subjects {
                if !listed.contains(label) {
                    let dir = format!("sub-{label}");
                    issues.push(
                        Issue::new(
                            IssueCode::UnlistedSubject,
                            format!("subject '{dir}' is not listed in {PARTICIPANTS_TSV}"),
                        )
                        .with_path(dir.as_str())
                        .with_hint(format!("add a '{dir}' row to {PARTICIPANTS_TSV}"))
                        .with_detail(IssueDetail::UnlistedSubject { subject: dir.clone() }),
                    );
                }
            }
        }

        let scans = self.scan_subjects(&subjects);
        let completed = scans.iter().filter(|s| s.is_some()).count();
        let incomplete = completed < subjects.len();

        result.enter(ScanPhase::Aggregating);
        let mut sidecars: BTreeMap<Utf8PathBuf, (String, Vec<Utf8PathBuf>)> = BTreeMap::new();
        let mut schemaless: BTreeMap<String, Vec<Utf8PathBuf>> = BTreeMap::new();
        let mut inventory = Inventory::default();
        for scan in scans.into_iter().flatten() {
            issues.extend(scan.issues);
            inventory.merge(scan.inventory);
            for (path, (modality, files)) in scan.sidecars {
                sidecars
                    .entry(path)
                    .or_insert_with(|| (modality, Vec::new()))
                    .1
                    .extend(files);
            }
            for (modality, dirs) in scan.schemaless {
                schemaless.entry(modality).or_default().extend(dirs);
            }
        }

        for (modality, dirs) in schemaless {
            issues.push(
                Issue::new(
                    IssueCode::SchemaUnavailable,
                    format!(
                        "schema version {} has no schema for modality '{modality}'",
                        self.spec.id()
                    ),
                )
                .with_paths(dirs),
            );
        }

        let resolver = SidecarResolver::new(self.view);
        for (sidecar, (modality, data_files)) in &sidecars {
            self.check_sidecar(&resolver, sidecar, modality, data_files, &mut issues);
        }
        debug!(sidecars = sidecars.len(), "sidecars checked");

        issues.sort_by_key(Issue::sort_key);
        if incomplete {
            warn!(completed, total = subjects.len(), "scan cancelled");
            issues.push(Issue::new(
                IssueCode::RunCancelled,
                format!(
                    "run cancelled after {completed} of {} subjects; results are incomplete",
                    subjects.len()
                ),
            ));
        }

        info!(
            subjects = subjects.len(),
            issues = issues.len(),
            "native scan finished"
        );
        result.incomplete = incomplete;
        result.inventory.merge(inventory);
        result.extend_issues(issues);
    }

    fn subject_labels(&self, issues: &mut Vec<Issue>) -> Vec<String> {
        let entries = match self.view.list_dir(Utf8Path::new("")) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "cannot list dataset root");
                Vec::new()
            }
        };
        let subjects: Vec<String> = entries
            .into_iter()
            .filter(|e| e.is_dir)
            .filter_map(|e| e.name.strip_prefix("sub-").map(str::to_string))
            .filter(|label| !label.is_empty())
            .collect();
        if subjects.is_empty() {
            issues.push(
                Issue::new(IssueCode::NoSubjects, "no sub-<label> directories found")
                    .with_hint("add one directory per participant, e.g. sub-01/"),
            );
        }
        subjects
    }

    /// Root-file checks. Returns the participant labels when `participants.tsv`
    /// is present and readable.
    fn check_root(&self, subjects: &[String], issues: &mut Vec<Issue>) -> Option<BTreeSet<String>> {
        let desc = Utf8Path::new(DATASET_DESCRIPTION_JSON);
        if !self.view.exists(desc) {
            issues.push(
                Issue::new(
                    IssueCode::MissingDatasetDescription,
                    format!("{DATASET_DESCRIPTION_JSON} is missing at the dataset root"),
                )
                .with_path(desc)
                .with_hint("create it from the dataset_description schema")
                .with_detail(IssueDetail::MissingRootFile {
                    file: DATASET_DESCRIPTION_JSON.to_string(),
                }),
            );
        } else {
            match self.view.read_to_string(desc).map_err(|e| format!("{e:#}")).and_then(|t| {
                serde_json::from_str::<Value>(&t).map_err(|e| format!("invalid JSON: {e}"))
            }) {
                Ok(Value::Object(doc)) => {
                    if let Some(schema) = self.spec.dataset_description() {
                        schema_issues(schema, desc, &Value::Object(doc), issues);
                    }
                }
                Ok(other) => issues.push(unreadable_root(
                    desc,
                    format!("expected a JSON object, found {}", json_kind(&other)),
                )),
                Err(reason) => issues.push(unreadable_root(desc, reason)),
            }
        }

        let participants = Utf8Path::new(PARTICIPANTS_TSV);
        if !self.view.exists(participants) {
            let mut issue = Issue::new(
                IssueCode::MissingParticipants,
                format!("{PARTICIPANTS_TSV} is missing at the dataset root"),
            )
            .with_path(participants)
            .with_detail(IssueDetail::MissingRootFile {
                file: PARTICIPANTS_TSV.to_string(),
            });
            if !subjects.is_empty() {
                issue = issue.with_hint(format!(
                    "create it with one row per subject directory ({} found)",
                    subjects.len()
                ));
            }
            issues.push(issue);
            return None;
        }

        let text = match self.view.read_to_string(participants) {
            Ok(t) => t,
            Err(e) => {
                issues.push(unreadable_root(participants, format!("{e:#}")));
                return None;
            }
        };
        match parse_participants(&text) {
            Ok(ids) => Some(ids),
            Err(reason) => {
                issues.push(unreadable_root(participants, reason));
                None
            }
        }
    }

    fn scan_subjects(&self, subjects: &[String]) -> Vec<Option<SubjectScan>> {
        let work = || {
            subjects
                .par_iter()
                .map(|label| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    Some(self.scan_subject(label))
                })
                .collect::<Vec<_>>()
        };

        if self.jobs == 0 {
            return work();
        }
        match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
            Ok(pool) => pool.install(work),
            Err(e) => {
                warn!(error = %e, jobs = self.jobs, "worker pool unavailable; using global pool");
                work()
            }
        }
    }

    fn scan_subject(&self, label: &str) -> SubjectScan {
        let mut scan = SubjectScan::default();
        scan.inventory.subjects.insert(label.to_string());
        let subject_dir = Utf8PathBuf::from(format!("sub-{label}"));

        for entry in self.list(&subject_dir).into_iter().filter(|e| e.is_dir) {
            if let Some(ses) = entry.name.strip_prefix("ses-") {
                scan.inventory.sessions.insert(ses.to_string());
                let ses_dir = subject_dir.join(&entry.name);
                for m in self.list(&ses_dir).into_iter().filter(|e| e.is_dir) {
                    self.scan_modality_dir(
                        &mut scan,
                        label,
                        Some(ses),
                        &ses_dir.join(&m.name),
                        &m.name,
                    );
                }
            } else {
                self.scan_modality_dir(
                    &mut scan,
                    label,
                    None,
                    &subject_dir.join(&entry.name),
                    &entry.name,
                );
            }
        }
        debug!(subject = label, issues = scan.issues.len(), "subject scanned");
        scan
    }

    fn scan_modality_dir(
        &self,
        scan: &mut SubjectScan,
        subject: &str,
        session: Option<&str>,
        dir: &Utf8Path,
        modality: &str,
    ) {
        if grammar::grammar_for(modality).is_none() {
            scan.issues.push(
                Issue::new(
                    IssueCode::UnknownModality,
                    format!(
                        "unknown modality directory '{modality}' (known: {})",
                        grammar::known_modalities().collect::<Vec<_>>().join(", ")
                    ),
                )
                .with_path(dir),
            );
            return;
        }
        if self.spec.schema(modality).is_none() {
            scan.schemaless
                .entry(modality.to_string())
                .or_default()
                .push(dir.to_path_buf());
        }

        let resolver = SidecarResolver::new(self.view);
        let files = self
            .list(dir)
            .into_iter()
            .filter(|e| !e.is_dir && !e.name.starts_with('.') && !e.name.ends_with(".json"));
        for file in files {
            let path = dir.join(&file.name);
            let m = match grammar::parse(&file.name, modality) {
                Ok(m) => m,
                Err(e) => {
                    scan.issues.push(Issue::new(e.code(), e.to_string()).with_path(&path));
                    continue;
                }
            };
            if let Some(issue) = directory_mismatch(&m, &path, subject, session) {
                scan.issues.push(issue);
                continue;
            }
            scan.inventory.record_file(modality, subject, m.task());

            let (candidates, found) = resolver.locate(&path, &m);
            match found {
                Some(sidecar) => {
                    scan.sidecars
                        .entry(sidecar)
                        .or_insert_with(|| (modality.to_string(), Vec::new()))
                        .1
                        .push(path);
                }
                None => {
                    let expected = candidates
                        .first()
                        .cloned()
                        .unwrap_or_else(|| path.with_extension("json"));
                    scan.issues.push(
                        Issue::new(
                            IssueCode::MissingSidecar,
                            format!(
                                "no sidecar found for {path} (tried {} locations)",
                                candidates.len()
                            ),
                        )
                        .with_path(&path)
                        .with_hint(format!("create {expected}"))
                        .with_detail(IssueDetail::MissingSidecar {
                            schema: modality.to_string(),
                            expected,
                        }),
                    );
                }
            }
        }
    }

    fn check_sidecar(
        &self,
        resolver: &SidecarResolver<'_>,
        sidecar: &Utf8Path,
        modality: &str,
        data_files: &[Utf8PathBuf],
        issues: &mut Vec<Issue>,
    ) {
        let doc = match resolver.load(sidecar) {
            SidecarLoad::Loaded(map) => Value::Object(map),
            SidecarLoad::Unreadable(reason) => {
                issues.push(
                    Issue::new(
                        IssueCode::UnreadableSidecar,
                        format!("sidecar {sidecar} is unreadable: {reason}"),
                    )
                    .with_path(sidecar)
                    .with_paths(data_files.iter().cloned()),
                );
                return;
            }
        };
        let Some(schema) = self.spec.schema(modality) else {
            return;
        };
        schema_issues(schema, sidecar, &doc, issues);
    }

    fn list(&self, dir: &Utf8Path) -> Vec<DirEntry> {
        self.view.list_dir(dir).unwrap_or_else(|e| {
            warn!(dir = %dir, error = %e, "cannot list directory");
            Vec::new()
        })
    }
}

fn schema_issues(schema: &CompiledSchema, file: &Utf8Path, doc: &Value, issues: &mut Vec<Issue>) {
    if let Some(map) = doc.as_object() {
        for field in schema.missing_required(map) {
            issues.push(
                Issue::new(
                    IssueCode::MissingRequiredField,
                    format!("required field '{field}' missing from {file}"),
                )
                .with_path(file)
                .with_hint(format!("add '{field}' to {file}"))
                .with_detail(IssueDetail::MissingField {
                    schema: schema.name().to_string(),
                    field,
                    sidecar: file.to_path_buf(),
                }),
            );
        }
    }
    for v in schema.violations(doc) {
        issues.push(
            Issue::new(IssueCode::SchemaViolation, format!("{file}: {v}"))
                .with_path(file)
                .with_detail(IssueDetail::SchemaViolation {
                    schema: schema.name().to_string(),
                    instance_path: v.instance_path,
                }),
        );
    }
}

fn unreadable_root(path: &Utf8Path, reason: String) -> Issue {
    Issue::new(IssueCode::UnreadableRootFile, format!("{path} is unreadable: {reason}"))
        .with_path(path)
}

fn directory_mismatch(
    m: &EntityMatch,
    path: &Utf8Path,
    subject: &str,
    session: Option<&str>,
) -> Option<Issue> {
    let mut problems = Vec::new();
    if m.subject() != Some(subject) {
        problems.push(format!(
            "sub-{} in filename but file is under sub-{subject}",
            m.subject().unwrap_or_default()
        ));
    }
    match (m.session(), session) {
        (Some(f), Some(d)) if f != d => {
            problems.push(format!("ses-{f} in filename but file is under ses-{d}"))
        }
        (Some(f), None) => {
            problems.push(format!("ses-{f} in filename but file is not in a session directory"))
        }
        (None, Some(d)) => problems.push(format!("filename lacks ses-{d} of its directory")),
        _ => {}
    }
    if problems.is_empty() {
        return None;
    }
    Some(
        Issue::new(IssueCode::EntityDirectoryMismatch, problems.join("; "))
            .with_path(path)
            .with_hint("move the file to the directory its entities name"),
    )
}

/// Participant labels (without the `sub-` prefix) from `participants.tsv`.
pub fn parse_participants(text: &str) -> Result<BTreeSet<String>, String> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or_else(|| "empty file".to_string())?;
    let column = header
        .split('\t')
        .position(|h| h.trim() == "participant_id")
        .ok_or_else(|| "header has no participant_id column".to_string())?;
    let mut out = BTreeSet::new();
    for line in lines {
        if let Some(id) = line.split('\t').nth(column) {
            let id = id.trim();
            out.insert(id.strip_prefix("sub-").unwrap_or(id).to_string());
        }
    }
    Ok(out)
}
