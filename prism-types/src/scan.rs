use crate::issue::{CodeClass, Issue, Severity};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Orchestrator states, recorded in the order they were entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Init,
    Scanning,
    Aggregating,
    DelegatingExternal,
    Plugins,
    Done,
}

/// Result of one validation run. Lifecycle is one run; never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetScanResult {
    pub dataset_root: Utf8PathBuf,
    pub spec_version: String,

    #[serde(default)]
    pub issues: Vec<Issue>,

    #[serde(default)]
    pub summary: ScanSummary,

    #[serde(default)]
    pub inventory: Inventory,

    /// True when the run was cancelled between subjects.
    #[serde(default)]
    pub incomplete: bool,

    #[serde(default)]
    pub phases: Vec<ScanPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl DatasetScanResult {
    pub fn new(dataset_root: Utf8PathBuf, spec_version: impl Into<String>) -> Self {
        Self {
            dataset_root,
            spec_version: spec_version.into(),
            issues: vec![],
            summary: ScanSummary::default(),
            inventory: Inventory::default(),
            incomplete: false,
            phases: vec![ScanPhase::Init],
            started_at: Some(Utc::now()),
            ended_at: None,
        }
    }

    pub fn enter(&mut self, phase: ScanPhase) {
        self.phases.push(phase);
    }

    /// Append issues and refresh the summary.
    pub fn extend_issues(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues.extend(issues);
        self.summary = ScanSummary::from_issues(&self.issues);
    }

    pub fn finish(&mut self) {
        self.summary = ScanSummary::from_issues(&self.issues);
        self.enter(ScanPhase::Done);
        self.ended_at = Some(Utc::now());
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn issues_in_class(&self, class: CodeClass) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.code.class() == class)
    }

    pub fn fixable_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.fixable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub errors: u64,
    pub warnings: u64,
    pub suggestions: u64,
    pub fixable: u64,

    #[serde(default)]
    pub by_code: BTreeMap<String, u64>,
}

impl ScanSummary {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut summary = ScanSummary::default();
        for issue in issues {
            match issue.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Suggestion => summary.suggestions += 1,
            }
            if issue.fixable {
                summary.fixable += 1;
            }
            *summary
                .by_code
                .entry(issue.code.as_str().to_string())
                .or_default() += 1;
        }
        summary
    }

    pub fn total(&self) -> u64 {
        self.errors + self.warnings + self.suggestions
    }
}

/// What the scan saw, independent of findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub subjects: BTreeSet<String>,

    #[serde(default)]
    pub sessions: BTreeSet<String>,

    #[serde(default)]
    pub modalities: BTreeMap<String, ModalityInventory>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalityInventory {
    pub data_files: u64,

    #[serde(default)]
    pub subjects: BTreeSet<String>,

    #[serde(default)]
    pub tasks: BTreeSet<String>,
}

impl Inventory {
    pub fn record_file(&mut self, modality: &str, subject: &str, task: Option<&str>) {
        let entry = self.modalities.entry(modality.to_string()).or_default();
        entry.data_files += 1;
        entry.subjects.insert(subject.to_string());
        if let Some(task) = task {
            entry.tasks.insert(task.to_string());
        }
    }

    /// Merge a per-subject inventory into the run inventory.
    pub fn merge(&mut self, other: Inventory) {
        self.subjects.extend(other.subjects);
        self.sessions.extend(other.sessions);
        for (modality, inv) in other.modalities {
            let entry = self.modalities.entry(modality).or_default();
            entry.data_files += inv.data_files;
            entry.subjects.extend(inv.subjects);
            entry.tasks.extend(inv.tasks);
        }
    }
}
