//! Issue code explanations for the `prism explain` command.

use prism_types::issue::IssueCode;

/// Long-form explanation of one issue code.
#[derive(Debug, Clone)]
pub struct CodeExplanation {
    pub code: IssueCode,
    pub description: &'static str,
    pub remediation: &'static str,
}

pub fn lookup_code(input: &str) -> Option<CodeExplanation> {
    let normalized = input.trim().to_ascii_uppercase();
    let normalized = if normalized.starts_with("PRISM") {
        normalized
    } else {
        format!("PRISM{normalized}")
    };
    let code: IssueCode = normalized.parse().ok()?;
    Some(explain(code))
}

pub fn list_codes() -> Vec<&'static str> {
    IssueCode::ALL.iter().map(|c| c.as_str()).collect()
}

pub fn explain(code: IssueCode) -> CodeExplanation {
    use IssueCode::*;
    let (description, remediation) = match code {
        MissingDatasetDescription => (
            "The dataset root has no dataset_description.json. Every dataset needs one; it names the study and the standard version it follows.",
            "Run `prism fix` to create it with placeholder values from the dataset_description schema, then replace the TODO values.",
        ),
        MissingParticipants => (
            "The dataset root has no participants.tsv.",
            "Run `prism fix` to create it with one row per sub-<label> directory.",
        ),
        NoSubjects => (
            "No sub-<label> directories were found at the dataset root.",
            "Add one directory per participant, e.g. sub-01/.",
        ),
        UnlistedSubject => (
            "A subject directory exists but participants.tsv has no row for it.",
            "Run `prism fix` to append the missing participant_id rows; other columns are filled with n/a.",
        ),
        UnknownModality => (
            "A directory under a subject or session is not a known modality.",
            "Rename it to one of the known modalities or move it out of the subject tree.",
        ),
        UnreadableRootFile => (
            "A root file exists but could not be read or parsed as JSON/TSV.",
            "Repair the file by hand; prism will not overwrite unreadable content.",
        ),
        MalformedFilename => (
            "A data file name does not follow the modality's naming pattern. The message names the expected pattern.",
            "Rename the file to match the pattern shown in the message.",
        ),
        EntityDirectoryMismatch => (
            "The sub/ses entities in a file name disagree with the directories the file lives in.",
            "Move the file to the matching directory or correct the entity labels.",
        ),
        InvalidEntityLabel => (
            "An entity label has characters the entity does not allow (e.g. a non-numeric run).",
            "Use alphanumeric labels, and digits only for run.",
        ),
        UnsupportedSuffix => (
            "The suffix or extension is not accepted for this modality.",
            "Use one of the suffix/extension pairs listed for the modality.",
        ),
        MissingSidecar => (
            "No JSON sidecar was found for a data file, neither beside it nor inherited from a session, subject or root level.",
            "Run `prism fix` to create <stem>.json beside the data file with placeholders from the modality schema.",
        ),
        UnreadableSidecar => (
            "The resolved sidecar could not be read, is truncated, or is not a JSON object.",
            "Repair the JSON by hand.",
        ),
        MissingRequiredField => (
            "The resolved sidecar lacks a field the schema requires.",
            "Run `prism fix` to add the missing keys with schema-derived placeholders; existing keys are never changed.",
        ),
        SchemaViolation => (
            "A sidecar field has the wrong type, is outside its enum, or fails its pattern.",
            "Correct the value as described in the message.",
        ),
        SchemaUnavailable => (
            "The selected schema version has no schema for this modality, so its sidecars are not content-checked.",
            "Choose a schema version that covers the modality or add one under schema_dir.",
        ),
        ExternalError | ExternalWarning | ExternalInfo => (
            "Finding reported by the external standards validator. The message starts with its own key.",
            "See the external validator's documentation for the key in brackets.",
        ),
        PluginFailed => (
            "A plugin returned an error, panicked, timed out, or printed output that is not a JSON findings array. Other plugins and native results are unaffected.",
            "Run the plugin by hand against the dataset and fix it, or disable its manifest.",
        ),
        PluginLoadFailed => (
            "A plugin manifest could not be loaded (bad TOML, empty command).",
            "Fix the manifest under the plugin directory.",
        ),
        ExternalValidatorFailed => (
            "The external validator could not be run, timed out, or failed without parseable findings.",
            "Check that the configured command is installed, or disable [external].",
        ),
        DatasetLocked => (
            "A concurrent `prism fix` held the dataset lock for the whole wait period, so the scan may see a partial write.",
            "Re-run once the fix has finished. A stale .prism.lock from a dead process is removed automatically.",
        ),
        RunCancelled => (
            "The run was cancelled before every subject was scanned; the result is incomplete.",
            "Re-run to completion.",
        ),
        PluginError | PluginWarning | PluginSuggestion => (
            "Finding reported by a plugin. The message starts with the plugin name in brackets.",
            "See the plugin's documentation.",
        ),
    };
    CodeExplanation {
        code,
        description,
        remediation,
    }
}
