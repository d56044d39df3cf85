use crate::plugin::{Plugin, PluginContext, PluginFinding, parse_findings};
use camino::Utf8PathBuf;
use prism_external::{CommandSpec, run};
use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A plugin implemented as an external command.
///
/// Invocation: `command... <dataset>` with the manifest directory as cwd and
/// the scan context as JSON on stdin. Findings are read from stdout.
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    name: String,
    command: Vec<String>,
    cwd: Utf8PathBuf,
    timeout: Duration,
}

impl CommandPlugin {
    pub fn new(
        name: impl Into<String>,
        command: Vec<String>,
        cwd: impl Into<Utf8PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            cwd: cwd.into(),
            timeout,
        }
    }
}

impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, ctx: &PluginContext<'_>) -> anyhow::Result<Vec<PluginFinding>> {
        let context = serde_json::json!({
            "dataset": ctx.dataset,
            "spec_version": ctx.result.spec_version,
            "result": ctx.result,
        });
        let mut argv = self.command.clone();
        argv.push(ctx.dataset.to_string());

        let spec = CommandSpec::new(argv, self.timeout)
            .cwd(self.cwd.clone())
            .stdin(serde_json::to_vec(&context)?);
        let out = run(&spec)?;
        if !out.success {
            let status = out
                .code
                .map(|c| format!("exit code {c}"))
                .unwrap_or_else(|| "terminated by signal".to_string());
            anyhow::bail!("{status}: {}", out.stderr_tail());
        }
        parse_findings(&out.stdout)
    }
}
