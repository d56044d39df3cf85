use anyhow::Context;
use clap::{Parser, Subcommand};
use fs_err as fs;
use prism_types::issue::IssueCode;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Workspace helper tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print wire schema identifiers used by prism.
    PrintSchemas,
    /// Print the issue code catalog as a markdown table.
    PrintCodes,
    /// Compile every bundled modality schema and check its required/properties sets.
    CheckSchemas {
        #[arg(long, default_value = "prism-schema/schemas")]
        dir: PathBuf,
    },
    /// Create a minimal dataset skeleton for manual testing.
    InitDataset {
        #[arg(long, default_value = "demo-dataset")]
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::PrintSchemas => {
            println!("{}", prism_types::schema::PRISM_SCAN_V1);
            println!("{}", prism_types::schema::PRISM_FIX_V1);
        }
        Command::PrintCodes => print!("{}", code_table()),
        Command::CheckSchemas { dir } => {
            let checked = check_schemas(&dir)?;
            println!("{checked} schema file(s) ok");
        }
        Command::InitDataset { dir } => {
            init_dataset(&dir)?;
            println!("initialized {}", dir.display());
        }
    }
    Ok(())
}

fn code_table() -> String {
    let mut out = String::from("| Code | Severity | Fixable | Meaning |\n|---|---|---|---|\n");
    for code in IssueCode::ALL {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            code,
            code.severity(),
            if code.fixable() { "yes" } else { "no" },
            code.title()
        ));
    }
    out
}

/// Returns the number of schema files checked.
fn check_schemas(dir: &Path) -> anyhow::Result<usize> {
    let mut problems = Vec::new();
    let mut checked = 0;

    let mut versions: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    versions.sort();

    for version in versions {
        let mut files: Vec<PathBuf> = fs::read_dir(&version)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.to_string_lossy().ends_with(".schema.json"))
            .collect();
        files.sort();
        for file in files {
            checked += 1;
            if let Err(e) = check_schema_file(&file) {
                problems.push(format!("{}: {e:#}", file.display()));
            }
        }
    }

    if !problems.is_empty() {
        anyhow::bail!("schema check failed:\n{}", problems.join("\n"));
    }
    Ok(checked)
}

fn check_schema_file(path: &Path) -> anyhow::Result<()> {
    let text = fs::read_to_string(path)?;
    let raw: serde_json::Value = serde_json::from_str(&text).context("invalid JSON")?;
    jsonschema::validator_for(&raw).map_err(|e| anyhow::anyhow!("does not compile: {e}"))?;

    let properties = raw
        .get("properties")
        .and_then(|p| p.as_object())
        .context("no top-level properties")?;
    let required = raw
        .get("required")
        .and_then(|r| r.as_array())
        .context("no top-level required array")?;
    for key in required {
        let key = key.as_str().context("required entry is not a string")?;
        if !properties.contains_key(key) {
            anyhow::bail!("required field '{key}' has no property declaration");
        }
    }
    Ok(())
}

fn init_dataset(dir: &Path) -> anyhow::Result<()> {
    let files = [
        (
            "dataset_description.json",
            "{\n  \"Name\": \"Demo\",\n  \"BIDSVersion\": \"1.8.0\",\n  \"DatasetType\": \"raw\"\n}\n",
        ),
        ("participants.tsv", "participant_id\nsub-01\n"),
        ("sub-01/survey/sub-01_task-demo_survey.tsv", "q1\n1\n"),
        ("task-demo_survey.json", "{\n  \"TaskName\": \"demo\",\n  \"Language\": \"en\",\n  \"Items\": {}\n}\n"),
    ];
    for (rel, contents) in files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
    }
    Ok(())
}
