//! Resumable batch driver.
//!
//! Walks the input table in order, evaluates each record through an
//! injected evaluator, and persists the growing result table as a
//! checkpoint pair. Record failures become error rows and the job moves on;
//! configuration errors stop it. A killed job resumes from its last
//! checkpoint.
use crate::checkpoint::{self, CheckpointPaths};
use crate::error::EvalError;
use crate::evaluate::{Dimension, Evaluation};
use crate::progress::ProgressTracker;
use crate::record::{InputTable, Record};
use crate::results::ResultRow;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;
pub const DEFAULT_CHECKIN_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub dimension: Dimension,
    /// Explicit job id; a timestamp id is generated when absent.
    pub job_id: Option<String>,
    pub checkpoint_dir: PathBuf,
    pub resume: bool,
    /// Process at most this many records from the start of the table.
    pub limit: Option<usize>,
    pub checkpoint_interval: usize,
    pub checkin_interval: Duration,
    /// Treat checkpoint write failures as fatal.
    pub strict_checkpoints: bool,
    pub verbose: bool,
}

impl JobOptions {
    pub fn new(dimension: Dimension, checkpoint_dir: PathBuf) -> Self {
        Self {
            dimension,
            job_id: None,
            checkpoint_dir,
            resume: false,
            limit: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            checkin_interval: DEFAULT_CHECKIN_INTERVAL,
            strict_checkpoints: false,
            verbose: false,
        }
    }
}

/// Counters reported when a job finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    /// Rows restored from a checkpoint instead of evaluated.
    pub resumed: usize,
    /// Records evaluated by this run, including failures.
    pub processed: usize,
    pub failed: usize,
    /// Rating cells that came from the keyword fallback.
    pub fallback_ratings: usize,
    pub total_time: Duration,
}

impl JobSummary {
    pub fn average_time(&self) -> Duration {
        match u32::try_from(self.processed) {
            Ok(count) if count > 0 => self.total_time / count,
            _ => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: String,
    pub paths: CheckpointPaths,
    pub rows: Vec<ResultRow>,
    pub summary: JobSummary,
}

/// Explicit id, or local time as `%Y%m%d_%H%M%S`.
pub fn resolve_job_id(explicit: Option<&str>) -> String {
    match explicit.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
    }
}

/// Run (or resume) one job over `table`.
pub fn run_job<F>(table: &InputTable, options: &JobOptions, mut evaluator: F) -> Result<JobOutcome>
where
    F: FnMut(&Record) -> Result<Evaluation, EvalError>,
{
    if options.checkpoint_interval == 0 {
        return Err(EvalError::config("checkpoint_interval must be at least 1").into());
    }
    let records = table.records()?;
    let job_id = resolve_job_id(options.job_id.as_deref());
    let dimension = options.dimension;
    fs::create_dir_all(&options.checkpoint_dir)
        .with_context(|| format!("create {}", options.checkpoint_dir.display()))?;
    let paths = CheckpointPaths::new(&options.checkpoint_dir, dimension, &job_id);

    let total = match options.limit {
        Some(limit) if limit > records.len() => {
            tracing::warn!(limit, available = records.len(), "limit exceeds input size; clamping");
            records.len()
        }
        Some(limit) => limit,
        None => records.len(),
    };

    let mut rows = if options.resume {
        restore(&paths, &job_id, dimension)
    } else {
        Vec::new()
    };
    let cursor = rows.len();
    let mut summary = JobSummary {
        resumed: cursor,
        ..JobSummary::default()
    };

    tracing::info!(
        job_id = %job_id,
        dimension = %dimension,
        total,
        start_index = cursor,
        "starting job"
    );
    if options.verbose {
        eprintln!("{dimension}: job {job_id} starting at {cursor} of {total}");
    }

    let started = Instant::now();
    let mut tracker = ProgressTracker::new(started, options.checkin_interval, cursor, total);
    for record in records.iter().take(total).skip(cursor) {
        let record_start = Instant::now();
        let failed = match evaluator(record) {
            Ok(evaluation) => {
                summary.fallback_ratings += evaluation.fallback_count();
                rows.push(ResultRow::from_evaluation(record, dimension, &evaluation));
                false
            }
            Err(err) if err.is_fatal() => {
                save(&paths, &job_id, dimension, &rows, false, options.strict_checkpoints)?;
                return Err(anyhow::Error::new(err)
                    .context(format!("job {job_id} stopped at record {}", record.index)));
            }
            Err(err) => {
                tracing::error!(
                    index = record.index,
                    permission = %record.permission_name,
                    error = %err,
                    "record evaluation failed"
                );
                rows.push(ResultRow::from_error(
                    record,
                    dimension,
                    &err.to_string(),
                    record_start.elapsed(),
                ));
                summary.failed += 1;
                true
            }
        };
        summary.processed += 1;

        if failed || (record.index + 1) % options.checkpoint_interval == 0 {
            save(&paths, &job_id, dimension, &rows, false, options.strict_checkpoints)?;
        }

        if let Some(snapshot) = tracker.poll(Instant::now(), record.index + 1) {
            tracing::info!(
                job_id = %job_id,
                completed = snapshot.completed,
                total = snapshot.total,
                elapsed_ms = snapshot.elapsed.as_millis() as u64,
                "progress"
            );
            if options.verbose {
                eprintln!("{dimension}: {snapshot}");
            }
        }
    }
    summary.total_time = started.elapsed();

    save(&paths, &job_id, dimension, &rows, true, options.strict_checkpoints)?;
    tracing::info!(
        job_id = %job_id,
        processed = summary.processed,
        failed = summary.failed,
        resumed = summary.resumed,
        fallback_ratings = summary.fallback_ratings,
        total_ms = summary.total_time.as_millis() as u64,
        "job complete"
    );

    Ok(JobOutcome {
        job_id,
        paths,
        rows,
        summary,
    })
}

fn restore(paths: &CheckpointPaths, job_id: &str, dimension: Dimension) -> Vec<ResultRow> {
    match checkpoint::load_checkpoint(paths, job_id, dimension) {
        Ok(Some(restored)) => {
            tracing::info!(
                job_id,
                rows = restored.rows.len(),
                failed = restored.rows.iter().filter(|row| row.is_error()).count(),
                is_final = restored.state.is_final,
                "resuming from checkpoint"
            );
            restored.rows
        }
        Ok(None) => {
            tracing::info!(job_id, "no checkpoint found; starting from the beginning");
            Vec::new()
        }
        Err(err) => {
            tracing::error!(
                job_id,
                error = %format!("{err:#}"),
                "checkpoint unreadable; starting from the beginning"
            );
            Vec::new()
        }
    }
}

fn save(
    paths: &CheckpointPaths,
    job_id: &str,
    dimension: Dimension,
    rows: &[ResultRow],
    is_final: bool,
    strict: bool,
) -> Result<()> {
    match checkpoint::write_checkpoint(paths, job_id, dimension, rows, is_final) {
        Ok(_) => Ok(()),
        Err(err) if strict => Err(err.context("write checkpoint")),
        Err(err) => {
            tracing::error!(
                job_id,
                rows = rows.len(),
                error = %format!("{err:#}"),
                "checkpoint write failed; continuing"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
