mod config;
mod explain;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use config::{ConfigMerger, ValidateOverrides};
use prism_core::adapters::FsWritePort;
use prism_core::pipeline::{registry_for, write_fix_artifacts, write_scan_artifacts};
use prism_core::{CancelToken, PluginRegistry, RunError, run_fix, run_validate};
use prism_render::{
    render_apply_lines, render_apply_md, render_code_md, render_scan_md, render_scan_text,
};
use prism_types::ToolInfo;
use prism_types::wire::{FixReportV1, ScanReportV1};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "prism",
    version,
    about = "Validator and idempotent auto-fixer for subject/session/modality datasets."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a dataset and report issues.
    Validate(ValidateArgs),
    /// Plan and apply fixes for fixable issues.
    Fix(FixArgs),
    /// List issue codes that `prism fix` can remediate.
    ListFixable(ListFixableArgs),
    /// Explain an issue code and how to resolve it.
    Explain(ExplainArgs),
}

#[derive(Debug, clap::Args)]
struct ScanArgs {
    /// Dataset root (default: current directory).
    #[arg(default_value = ".")]
    dataset: Utf8PathBuf,

    /// Schema version or alias.
    #[arg(long)]
    schema_version: Option<String>,

    /// Directory with additional schema versions.
    #[arg(long)]
    schema_dir: Option<Utf8PathBuf>,

    /// Worker threads for the per-subject phase.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also write report artifacts into this directory.
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct ValidateArgs {
    #[command(flatten)]
    scan: ScanArgs,

    /// Do not run plugins.
    #[arg(long, default_value_t = false)]
    no_plugins: bool,

    /// Plugin manifest directory (default: <dataset>/.prism/validators).
    #[arg(long)]
    plugin_dir: Option<Utf8PathBuf>,

    /// Run the external standards validator.
    #[arg(long, conflicts_with = "no_external")]
    external: bool,

    /// Skip the external standards validator even if configured.
    #[arg(long)]
    no_external: bool,
}

#[derive(Debug, Parser)]
struct FixArgs {
    #[command(flatten)]
    scan: ScanArgs,

    /// Preview the fixes without writing anything.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Allowlist patterns for issue codes (e.g. "PRISM2*").
    #[arg(long)]
    allow: Vec<String>,

    /// Denylist patterns for issue codes.
    #[arg(long)]
    deny: Vec<String>,
}

#[derive(Debug, Parser)]
struct ListFixableArgs {
    #[arg(long, value_enum, default_value = "text")]
    format: ListFormat,
}

#[derive(Debug, Parser)]
struct ExplainArgs {
    /// Issue code, e.g. "PRISM201" or "201".
    code: String,

    #[arg(long, value_enum, default_value = "text")]
    format: ListFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ListFormat {
    Text,
    Json,
}

/// 0 = no ERROR issues, 1 = ERROR issues present, 2 = configuration or tool error.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match real_main(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn real_main(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Command::Validate(args) => cmd_validate(args),
        Command::Fix(args) => cmd_fix(args),
        Command::ListFixable(args) => cmd_list_fixable(args),
        Command::Explain(args) => cmd_explain(args),
    }
}

fn overrides(scan: &ScanArgs) -> ValidateOverrides {
    ValidateOverrides {
        schema_version: scan.schema_version.clone(),
        schema_dir: scan.schema_dir.clone(),
        jobs: scan.jobs,
        ..ValidateOverrides::default()
    }
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let root = args.scan.dataset.clone();
    let file_config = config::load_or_default(&root).context("load prism.toml config")?;
    let cli = ValidateOverrides {
        no_plugins: args.no_plugins,
        plugin_dir: args.plugin_dir.clone(),
        external: if args.external {
            Some(true)
        } else if args.no_external {
            Some(false)
        } else {
            None
        },
        ..overrides(&args.scan)
    };
    let settings = ConfigMerger::new(file_config).merge_validate_args(&root, &cli);
    debug!(?settings, "merged validate settings");

    let registry = registry_for(&settings);
    let result = run_validate(&settings, &registry, PluginRegistry::new(), &CancelToken::new())
        .map_err(run_error)?;

    let tool = tool_info();
    match args.scan.format {
        OutputFormat::Text => print!("{}", render_scan_text(&result)),
        OutputFormat::Markdown => print!("{}", render_scan_md(&result)),
        OutputFormat::Json => {
            let wire = ScanReportV1::from_result(&result, &tool).context("convert scan to wire")?;
            println!("{}", serde_json::to_string_pretty(&wire)?);
        }
    }
    if let Some(out_dir) = &args.scan.out_dir {
        write_scan_artifacts(&result, &tool, out_dir, &FsWritePort)?;
        info!("wrote scan report to {}", out_dir);
    }

    Ok(gate(result.has_errors()))
}

fn cmd_fix(args: FixArgs) -> anyhow::Result<ExitCode> {
    let root = args.scan.dataset.clone();
    let file_config = config::load_or_default(&root).context("load prism.toml config")?;
    let merger = ConfigMerger::new(file_config);
    let validate = merger.merge_validate_args(&root, &overrides(&args.scan));
    let settings = merger.merge_fix_args(validate, args.dry_run, &args.allow, &args.deny);
    debug!(?settings, "merged fix settings");

    let registry = registry_for(&settings.validate);
    let outcome = run_fix(&settings, &registry, &CancelToken::new()).map_err(run_error)?;

    let tool = tool_info();
    match args.scan.format {
        OutputFormat::Text => {
            print!("{}", render_apply_lines(&outcome.report));
            let s = &outcome.report.summary;
            println!(
                "{} action(s): {} applied, {} would apply, {} unchanged, {} skipped, {} failed",
                s.attempted, s.applied, s.would_apply, s.unchanged, s.skipped, s.failed
            );
        }
        OutputFormat::Markdown => print!("{}", render_apply_md(&outcome.report)),
        OutputFormat::Json => {
            let wire = FixReportV1::new(
                &tool,
                root.as_str(),
                &outcome.actions,
                &outcome.report,
            )
            .context("convert fix report to wire")?;
            println!("{}", serde_json::to_string_pretty(&wire)?);
        }
    }
    if let Some(out_dir) = &args.scan.out_dir {
        write_fix_artifacts(&outcome, &tool, out_dir, &FsWritePort)?;
        info!("wrote fix artifacts to {}", out_dir);
    }

    if outcome.report.summary.failed > 0 {
        anyhow::bail!("{} fix action(s) failed", outcome.report.summary.failed);
    }
    Ok(gate(outcome.remaining_errors() > 0))
}

fn cmd_list_fixable(args: ListFixableArgs) -> anyhow::Result<ExitCode> {
    let codes = prism_fix::list_fixable_codes();
    match args.format {
        ListFormat::Text => {
            println!("Fixable issue codes:\n");
            println!("  {:<10} {:<10} TITLE", "CODE", "SEVERITY");
            println!("  {:<10} {:<10} -----", "----", "--------");
            for code in &codes {
                println!("  {:<10} {:<10} {}", code, code.severity(), code.title());
            }
            println!();
            println!("Use 'prism explain <code>' for details.");
        }
        ListFormat::Json => {
            let out: Vec<_> = codes
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "code": c.as_str(),
                        "severity": c.severity().as_str(),
                        "title": c.title(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_explain(args: ExplainArgs) -> anyhow::Result<ExitCode> {
    let Some(exp) = explain::lookup_code(&args.code) else {
        anyhow::bail!(
            "Unknown issue code: '{}'\n\nKnown codes: {}",
            args.code,
            explain::list_codes().join(", ")
        );
    };

    match args.format {
        ListFormat::Text => {
            print!("{}", render_code_md(exp.code));
            println!();
            println!("## Description\n\n{}\n", exp.description);
            println!("## Remediation\n\n{}", exp.remediation);
        }
        ListFormat::Json => {
            let out = serde_json::json!({
                "code": exp.code.as_str(),
                "title": exp.code.title(),
                "severity": exp.code.severity().as_str(),
                "fixable": exp.code.fixable(),
                "description": exp.description,
                "remediation": exp.remediation,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn gate(has_errors: bool) -> ExitCode {
    if has_errors {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_error(e: RunError) -> anyhow::Error {
    match e {
        RunError::Configuration(c) => anyhow::Error::new(c).context("configuration error"),
        RunError::Internal(e) => e,
    }
}

fn tool_info() -> ToolInfo {
    ToolInfo::prism(env!("CARGO_PKG_VERSION"))
}
