use crate::command::{CommandPlugin, DEFAULT_TIMEOUT};
use crate::manifest::discover_manifests;
use crate::plugin::{FnPlugin, Plugin, PluginContext, PluginFinding};
use camino::Utf8Path;
use prism_types::issue::{Issue, IssueCode, IssueDetail};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered set of plugins plus the issues raised while loading them.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
    load_issues: Vec<Issue>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "registered plugin");
        self.plugins.push(plugin);
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&PluginContext<'_>) -> anyhow::Result<Vec<PluginFinding>> + Send + Sync + 'static,
    {
        self.register(Box::new(FnPlugin::new(name, f)));
    }

    /// Register every enabled manifest under `dir`. Each manifest that cannot
    /// be loaded becomes one PRISM902 issue; the others still load.
    pub fn discover(&mut self, dir: &Utf8Path) {
        let discovered = match discover_manifests(dir) {
            Ok(d) => d,
            Err(e) => {
                warn!(dir = %dir, error = %e, "plugin discovery failed");
                self.load_issues.push(
                    Issue::new(
                        IssueCode::PluginLoadFailed,
                        format!("cannot scan {dir} for plugins: {e:#}"),
                    )
                    .with_path(dir),
                );
                return;
            }
        };

        for d in discovered {
            let name = d.name().to_string();
            match d.manifest {
                Ok(m) if !m.enabled => {
                    debug!(plugin = %name, "plugin disabled by manifest");
                }
                Ok(m) => {
                    let cwd = d.path.parent().unwrap_or(dir).to_path_buf();
                    let timeout = m
                        .timeout_secs
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_TIMEOUT);
                    self.register(Box::new(CommandPlugin::new(&name, m.command, cwd, timeout)));
                }
                Err(e) => {
                    warn!(plugin = %name, path = %d.path, error = %e, "plugin manifest rejected");
                    self.load_issues.push(
                        Issue::new(
                            IssueCode::PluginLoadFailed,
                            format!("plugin '{name}' could not be loaded: {e}"),
                        )
                        .with_path(d.path.as_str())
                        .with_detail(IssueDetail::Plugin { plugin: name }),
                    );
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn load_issues(&self) -> &[Issue] {
        &self.load_issues
    }

    /// Run every plugin in registration order. Load issues come first, then
    /// each plugin's findings (or its single PRISM901) in plugin order.
    pub fn run_all(&self, ctx: &PluginContext<'_>) -> Vec<Issue> {
        let mut out = self.load_issues.clone();
        for plugin in &self.plugins {
            out.extend(run_one(plugin.as_ref(), ctx));
        }
        out
    }
}

fn run_one(plugin: &dyn Plugin, ctx: &PluginContext<'_>) -> Vec<Issue> {
    let name = plugin.name();
    let outcome = catch_unwind(AssertUnwindSafe(|| plugin.validate(ctx)));
    let reason = match outcome {
        Ok(Ok(findings)) => {
            info!(plugin = name, findings = findings.len(), "plugin finished");
            return findings.into_iter().map(|f| to_issue(name, f)).collect();
        }
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    warn!(plugin = name, %reason, "plugin failed");
    vec![
        Issue::new(
            IssueCode::PluginFailed,
            format!("plugin '{name}' failed: {reason}"),
        )
        .with_detail(IssueDetail::Plugin {
            plugin: name.to_string(),
        }),
    ]
}

fn to_issue(plugin: &str, f: PluginFinding) -> Issue {
    Issue::new(
        IssueCode::for_plugin_severity(f.severity),
        format!("[{plugin}] {}", f.message),
    )
    .with_paths(f.paths)
    .with_detail(IssueDetail::Plugin {
        plugin: plugin.to_string(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
