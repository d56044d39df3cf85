use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity class of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
    Suggestion,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Suggestion => "SUGGESTION",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Severity::Error),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "SUGGESTION" | "INFO" => Ok(Severity::Suggestion),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}'")]
pub struct UnknownSeverity(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown issue code '{0}'")]
pub struct UnknownCode(pub String);

/// Code group, used to filter reports by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeClass {
    Structure,
    Filename,
    SidecarPresence,
    SchemaContent,
    ExternalStandard,
    Internal,
}

macro_rules! issue_codes {
    ($( $variant:ident => ($id:literal, $sev:ident, $fixable:literal, $title:literal), )*) => {
        /// Closed catalog of issue codes.
        ///
        /// Each code carries a fixed severity and fixable flag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum IssueCode {
            $( $variant, )*
        }

        impl IssueCode {
            pub const ALL: &'static [IssueCode] = &[ $( IssueCode::$variant, )* ];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( IssueCode::$variant => $id, )*
                }
            }

            pub fn severity(self) -> Severity {
                match self {
                    $( IssueCode::$variant => Severity::$sev, )*
                }
            }

            pub fn fixable(self) -> bool {
                match self {
                    $( IssueCode::$variant => $fixable, )*
                }
            }

            pub fn title(self) -> &'static str {
                match self {
                    $( IssueCode::$variant => $title, )*
                }
            }
        }

        impl FromStr for IssueCode {
            type Err = UnknownCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $( $id => Ok(IssueCode::$variant), )*
                    other => Err(UnknownCode(other.to_string())),
                }
            }
        }
    };
}

issue_codes! {
    MissingDatasetDescription => ("PRISM001", Error, true, "dataset_description.json missing"),
    MissingParticipants => ("PRISM002", Warning, true, "participants.tsv missing"),
    NoSubjects => ("PRISM003", Warning, false, "no subject directories"),
    UnlistedSubject => ("PRISM004", Warning, true, "subject not listed in participants.tsv"),
    UnknownModality => ("PRISM005", Warning, false, "unknown modality directory"),
    UnreadableRootFile => ("PRISM006", Error, false, "root file unreadable or malformed"),
    MalformedFilename => ("PRISM101", Error, false, "malformed filename"),
    EntityDirectoryMismatch => ("PRISM102", Error, false, "filename entity disagrees with directory"),
    InvalidEntityLabel => ("PRISM103", Error, false, "invalid entity label"),
    UnsupportedSuffix => ("PRISM104", Error, false, "unsupported suffix or extension"),
    MissingSidecar => ("PRISM201", Error, true, "sidecar missing"),
    UnreadableSidecar => ("PRISM202", Error, false, "sidecar unreadable or malformed"),
    MissingRequiredField => ("PRISM301", Error, true, "required field missing"),
    SchemaViolation => ("PRISM302", Error, false, "schema violation"),
    SchemaUnavailable => ("PRISM303", Warning, false, "no schema for modality"),
    ExternalError => ("PRISM501", Error, false, "external validator error"),
    ExternalWarning => ("PRISM502", Warning, false, "external validator warning"),
    ExternalInfo => ("PRISM503", Suggestion, false, "external validator note"),
    PluginFailed => ("PRISM901", Error, false, "plugin failed"),
    PluginLoadFailed => ("PRISM902", Warning, false, "plugin could not be loaded"),
    ExternalValidatorFailed => ("PRISM903", Error, false, "external validator failed to run"),
    DatasetLocked => ("PRISM904", Warning, false, "dataset locked during scan"),
    RunCancelled => ("PRISM905", Warning, false, "run cancelled before completion"),
    PluginError => ("PRISM911", Error, false, "plugin error"),
    PluginWarning => ("PRISM912", Warning, false, "plugin warning"),
    PluginSuggestion => ("PRISM913", Suggestion, false, "plugin suggestion"),
}

impl IssueCode {
    pub fn class(self) -> CodeClass {
        match &self.as_str()[5..6] {
            "0" => CodeClass::Structure,
            "1" => CodeClass::Filename,
            "2" => CodeClass::SidecarPresence,
            "3" => CodeClass::SchemaContent,
            "5" => CodeClass::ExternalStandard,
            _ => CodeClass::Internal,
        }
    }

    /// Codes that have a deterministic remediation.
    pub fn fixable_codes() -> Vec<IssueCode> {
        Self::ALL.iter().copied().filter(|c| c.fixable()).collect()
    }

    /// Plugin finding code for a plugin-reported severity.
    pub fn for_plugin_severity(severity: Severity) -> IssueCode {
        match severity {
            Severity::Error => IssueCode::PluginError,
            Severity::Warning => IssueCode::PluginWarning,
            Severity::Suggestion => IssueCode::PluginSuggestion,
        }
    }

    /// External-standard code for an external severity.
    pub fn for_external_severity(severity: Severity) -> IssueCode {
        match severity {
            Severity::Error => IssueCode::ExternalError,
            Severity::Warning => IssueCode::ExternalWarning,
            Severity::Suggestion => IssueCode::ExternalInfo,
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for IssueCode {
    type Error = UnknownCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IssueCode> for String {
    fn from(code: IssueCode) -> Self {
        code.as_str().to_string()
    }
}

/// Structured detail attached to an issue.
///
/// The fix planner reads these instead of parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueDetail {
    MissingRootFile {
        file: String,
    },
    UnlistedSubject {
        subject: String,
    },
    MissingSidecar {
        schema: String,
        expected: Utf8PathBuf,
    },
    MissingField {
        schema: String,
        field: String,
        sidecar: Utf8PathBuf,
    },
    SchemaViolation {
        schema: String,
        instance_path: String,
    },
    Plugin {
        plugin: String,
    },
    External {
        key: String,
    },
}

/// One finding. Built through [`Issue::new`] so severity and fixable always
/// come from the code catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub severity: Severity,
    pub message: String,

    /// Paths relative to the dataset root.
    #[serde(default)]
    pub affected_paths: Vec<Utf8PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,

    pub fixable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<IssueDetail>,
}

impl Issue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
            affected_paths: vec![],
            fix_hint: None,
            fixable: code.fixable(),
            detail: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.affected_paths.push(path.into());
        self
    }

    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.affected_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    pub fn with_detail(mut self, detail: IssueDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn primary_path(&self) -> &str {
        self.affected_paths
            .first()
            .map(|p| p.as_str())
            .unwrap_or("")
    }

    /// Deterministic ordering key within a phase.
    pub fn sort_key(&self) -> (String, IssueCode, String) {
        (self.primary_path().to_string(), self.code, self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_parse_back_from_their_ids() {
        for code in IssueCode::ALL {
            assert_eq!(code.as_str().parse::<IssueCode>(), Ok(*code));
            assert!(code.as_str().starts_with("PRISM"));
            assert_eq!(code.as_str().len(), 8);
        }
    }

    #[test]
    fn code_class_follows_hundreds_digit() {
        assert_eq!(IssueCode::MissingDatasetDescription.class(), CodeClass::Structure);
        assert_eq!(IssueCode::MalformedFilename.class(), CodeClass::Filename);
        assert_eq!(IssueCode::MissingSidecar.class(), CodeClass::SidecarPresence);
        assert_eq!(IssueCode::MissingRequiredField.class(), CodeClass::SchemaContent);
        assert_eq!(IssueCode::ExternalWarning.class(), CodeClass::ExternalStandard);
        assert_eq!(IssueCode::PluginFailed.class(), CodeClass::Internal);
    }

    #[test]
    fn fixable_codes_are_the_remediable_set() {
        let ids: Vec<&str> = IssueCode::fixable_codes()
            .into_iter()
            .map(IssueCode::as_str)
            .collect();
        assert_eq!(
            ids,
            vec!["PRISM001", "PRISM002", "PRISM004", "PRISM201", "PRISM301"]
        );
    }

    #[test]
    fn issue_new_takes_pairing_from_catalog() {
        let issue = Issue::new(IssueCode::MalformedFilename, "bad name").with_path("a.tsv");
        assert_eq!(issue.severity, Severity::Error);
        assert!(!issue.fixable);
        assert_eq!(issue.primary_path(), "a.tsv");
    }

    #[test]
    fn code_serializes_as_string() {
        let json = serde_json::to_string(&IssueCode::MissingSidecar).expect("serialize");
        assert_eq!(json, "\"PRISM201\"");
        let err = serde_json::from_str::<IssueCode>("\"PRISM777\"");
        assert!(err.is_err());
    }

    #[test]
    fn severity_accepts_common_spellings() {
        assert_eq!("warn".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("info".parse::<Severity>(), Ok(Severity::Suggestion));
        assert!("fatal".parse::<Severity>().is_err());
    }
}
