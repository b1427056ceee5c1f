//! CLI argument parsing.
//!
//! Flags left unset fall back to `permeval.json`, then built-in defaults.
use crate::evaluate::Dimension;
use crate::extract::{parse_field_mapping, DEFAULT_SOURCE_COLUMN};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "permeval",
    version,
    about = "Resumable LM classification of Salesforce permissions",
    after_help = "Examples:\n  permeval classify --input perms.jsonl --prompt prompts/risk.txt --dimension risk\n  permeval classify --input perms.jsonl --prompt prompts/risk.txt --dimension risk --job-id 20240501_093000 --resume\n  permeval status --job-id 20240501_093000 --dimension risk --json\n  permeval extract --input data/checkpoints/risk_20240501_093000.jsonl --out risk_fields.jsonl",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Classify(ClassifyArgs),
    Extract(ExtractArgs),
    Status(StatusArgs),
}

/// Classify every record of an input table along one dimension.
#[derive(Parser, Debug)]
#[command(about = "Evaluate an input table with checkpointing and resume")]
pub struct ClassifyArgs {
    /// Input table (JSON array or JSON Lines)
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Prompt template with {permission_*} placeholders
    #[arg(long, value_name = "FILE")]
    pub prompt: PathBuf,

    #[arg(long, value_enum)]
    pub dimension: Dimension,

    /// Job identifier; defaults to the current local time
    #[arg(long, value_name = "ID")]
    pub job_id: Option<String>,

    /// Continue from the job's checkpoint if one exists
    #[arg(long, requires = "job_id")]
    pub resume: bool,

    #[arg(long, value_name = "DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Records between checkpoint writes
    #[arg(long, value_name = "N")]
    pub checkpoint_interval: Option<usize>,

    /// Seconds between progress reports
    #[arg(long, value_name = "SECS")]
    pub checkin_interval_secs: Option<u64>,

    /// Only process the first N records
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Use a local command as the model backend
    #[arg(long, value_name = "CMD")]
    pub lm_command: Option<String>,

    /// Config file (default: ./permeval.json when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write the final result table here
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Fail the job when a checkpoint cannot be written
    #[arg(long)]
    pub strict_checkpoints: bool,

    /// Emit a verbose transcript of the run
    #[arg(long)]
    pub verbose: bool,
}

/// Lift JSON fields out of a result column into their own columns.
#[derive(Parser, Debug)]
#[command(about = "Extract JSON fields from a result table")]
pub struct ExtractArgs {
    /// Result table (JSON Lines)
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Column holding the JSON object
    #[arg(long, value_name = "NAME", default_value = DEFAULT_SOURCE_COLUMN)]
    pub column: String,

    /// Field mapping as json_key=Column (repeatable; replaces the defaults)
    #[arg(long = "field", value_name = "KEY=COLUMN", value_parser = parse_field_mapping)]
    pub fields: Vec<(String, String)>,
}

/// Report where a job stands on disk.
#[derive(Parser, Debug)]
#[command(about = "Summarize a job's checkpoint state")]
pub struct StatusArgs {
    #[arg(long, value_name = "ID")]
    pub job_id: String,

    #[arg(long, value_enum)]
    pub dimension: Dimension,

    #[arg(long, value_name = "DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
