use camino::Utf8Path;
use prism_types::issue::Severity;
use prism_types::scan::DatasetScanResult;
use serde::{Deserialize, Serialize};

/// Read-only view handed to every plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    pub dataset: &'a Utf8Path,
    pub result: &'a DatasetScanResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFinding {
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

impl PluginFinding {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            paths: vec![],
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, ctx: &PluginContext<'_>) -> anyhow::Result<Vec<PluginFinding>>;
}

/// Adapts a plain function into a [`Plugin`].
pub struct FnPlugin<F> {
    name: String,
    f: F,
}

impl<F> FnPlugin<F>
where
    F: Fn(&PluginContext<'_>) -> anyhow::Result<Vec<PluginFinding>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&PluginContext<'_>) -> anyhow::Result<Vec<PluginFinding>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, ctx: &PluginContext<'_>) -> anyhow::Result<Vec<PluginFinding>> {
        (self.f)(ctx)
    }
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    severity: String,
    message: String,
    #[serde(default)]
    paths: Vec<String>,
}

/// Parse a plugin's JSON output: an array of `{severity, message, paths?}`.
/// Severity is matched leniently (`warn`, `info`, any case).
pub fn parse_findings(text: &str) -> anyhow::Result<Vec<PluginFinding>> {
    let raw: Vec<RawFinding> = serde_json::from_str(text.trim())
        .map_err(|e| anyhow::anyhow!("output is not a JSON array of findings: {e}"))?;
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| {
            let severity = r
                .severity
                .parse::<Severity>()
                .map_err(|e| anyhow::anyhow!("finding {i}: {e}"))?;
            Ok(PluginFinding {
                severity,
                message: r.message,
                paths: r.paths,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lenient_severities() {
        let findings = parse_findings(
            r#"[{"severity": "warn", "message": "a"},
                {"severity": "ERROR", "message": "b", "paths": ["x.tsv"]},
                {"severity": "info", "message": "c"}]"#,
        )
        .expect("parse");
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[1].paths, vec!["x.tsv".to_string()]);
        assert_eq!(findings[2].severity, Severity::Suggestion);
    }

    #[test]
    fn rejects_unknown_severity_and_non_arrays() {
        assert!(parse_findings(r#"[{"severity": "fatal", "message": "x"}]"#).is_err());
        assert!(parse_findings(r#"{"severity": "error", "message": "x"}"#).is_err());
        assert!(parse_findings("").is_err());
    }
}
