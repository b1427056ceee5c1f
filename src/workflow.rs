//! Command implementations behind the CLI.
use crate::checkpoint::{self, CheckpointPaths, CheckpointState, JobStatus};
use crate::cli::{ClassifyArgs, ExtractArgs, StatusArgs};
use crate::config::{self, RunConfig};
use crate::driver::{self, JobOptions, JobOutcome};
use crate::evaluate::{evaluate, Dimension, EvaluateOptions, PromptTemplate};
use crate::extract;
use crate::progress::format_duration;
use crate::record;
use crate::results;
use crate::session::SessionFactory;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Run (or resume) a classification job and print its summary.
pub fn run_classify(args: &ClassifyArgs) -> Result<()> {
    let config = classify_config(args)?;
    let table = record::load_input_table(&args.input)?;
    let template = PromptTemplate::load(&args.prompt)?;
    let backend = config::build_backend(&config, args.lm_command.as_deref())?;
    let factory = SessionFactory::new(backend, config.model.clone(), config.retry.policy());
    let mut session = factory.create_session()?;
    if args.verbose {
        eprintln!(
            "classify: {} records, backend {}, model {}",
            table.len(),
            factory.backend_name(),
            factory.model()
        );
    }

    let dimension = args.dimension;
    let eval_options = EvaluateOptions {
        grounding_max_attempts: config.grounding_max_attempts,
        full_fidelity: dimension.full_fidelity(),
    };
    let job = JobOptions {
        dimension,
        job_id: args.job_id.clone(),
        checkpoint_dir: config.checkpoint_dir.clone(),
        resume: args.resume,
        limit: args.limit,
        checkpoint_interval: config.checkpoint_interval,
        checkin_interval: config.checkin_interval(),
        strict_checkpoints: args.strict_checkpoints,
        verbose: args.verbose,
    };

    let outcome = driver::run_job(&table, &job, |record| {
        evaluate(
            &template,
            record,
            dimension,
            Some(&mut session),
            None,
            &eval_options,
        )
    })?;

    if let Some(out) = &args.out {
        results::write_rows(out, &outcome.rows)?;
    }
    print_job_summary(&outcome, args.out.as_deref());
    Ok(())
}

fn classify_config(args: &ClassifyArgs) -> Result<RunConfig> {
    let mut config = config::resolve_config(args.config.as_deref())?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(dir) = &args.checkpoint_dir {
        config.checkpoint_dir = dir.clone();
    }
    if let Some(interval) = args.checkpoint_interval {
        config.checkpoint_interval = interval;
    }
    if let Some(secs) = args.checkin_interval_secs {
        config.checkin_interval_secs = secs;
    }
    config::validate_config(&config).context("validate command-line overrides")?;
    Ok(config)
}

fn print_job_summary(outcome: &JobOutcome, out: Option<&Path>) {
    let summary = &outcome.summary;
    println!(
        "job {}: {} rows ({} evaluated, {} resumed, {} failed, {} fallback ratings)",
        outcome.job_id,
        outcome.rows.len(),
        summary.processed,
        summary.resumed,
        summary.failed,
        summary.fallback_ratings
    );
    println!(
        "time: {} total, {}ms average per record",
        format_duration(summary.total_time),
        summary.average_time().as_millis()
    );
    println!("results: {}", outcome.paths.results.display());
    if let Some(out) = out {
        println!("copied to: {}", out.display());
    }
}

/// Extract JSON fields from a result table into a new table.
pub fn run_extract(args: &ExtractArgs) -> Result<()> {
    let rows = results::read_rows(&args.input)?;
    let fields = if args.fields.is_empty() {
        extract::default_field_map()
    } else {
        args.fields.clone()
    };
    let extracted = extract::extract_fields(&rows, &args.column, &fields);
    results::write_rows(&args.out, &extracted)?;
    let columns: Vec<&str> = fields.iter().map(|(_, column)| column.as_str()).collect();
    println!(
        "extracted {} rows into {} (columns: {})",
        extracted.len(),
        args.out.display(),
        columns.join(", ")
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    job_id: String,
    dimension: Dimension,
    state: &'static str,
    marker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    checkpoint: Option<CheckpointState>,
}

/// Print where a job stands: not started, incomplete, or completed.
pub fn run_status(args: &StatusArgs) -> Result<()> {
    let checkpoint_dir = match &args.checkpoint_dir {
        Some(dir) => dir.clone(),
        None => config::resolve_config(args.config.as_deref())?.checkpoint_dir,
    };
    let paths = CheckpointPaths::new(&checkpoint_dir, args.dimension, &args.job_id);
    let (state, checkpoint) = match checkpoint::job_status(&paths)? {
        JobStatus::NotStarted => ("not_started", None),
        JobStatus::Incomplete(state) => ("incomplete", Some(state)),
        JobStatus::Completed(state) => ("completed", Some(state)),
    };
    let report = StatusReport {
        job_id: args.job_id.clone(),
        dimension: args.dimension,
        state,
        marker: paths.marker.display().to_string(),
        checkpoint,
    };

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize status report")?;
        println!("{text}");
        return Ok(());
    }

    println!("job {} ({}): {}", report.job_id, report.dimension, report.state);
    match &report.checkpoint {
        Some(state) => {
            println!("rows: {}", state.rows);
            println!("written: {}", state.timestamp);
            if !state.is_final {
                println!(
                    "next: permeval classify --dimension {} --job-id {} --resume ...",
                    report.dimension, report.job_id
                );
            }
        }
        None => println!("no checkpoint at {}", report.marker),
    }
    Ok(())
}
