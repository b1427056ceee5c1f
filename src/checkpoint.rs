//! Durable job state: a result file plus a marker describing it.
//!
//! The pair lives under the checkpoint directory as
//! `<dimension>_<job_id>.jsonl` (rows) and `<dimension>_<job_id>.json`
//! (marker). Each file is replaced atomically, rows first, so a crash
//! between the two writes leaves a result file that is ahead of its marker.
//! Loading reconciles that case by truncating back to the marker.

use crate::evaluate::Dimension;
use crate::results::{self, ResultRow};
use crate::staging;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 1;

/// Locations of one job's checkpoint pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub marker: PathBuf,
    pub results: PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: &Path, dimension: Dimension, job_id: &str) -> Self {
        let stem = format!("{dimension}_{job_id}");
        Self {
            marker: dir.join(format!("{stem}.json")),
            results: dir.join(format!("{stem}.jsonl")),
        }
    }

    fn pair_exists(&self) -> bool {
        self.marker.is_file() && self.results.is_file()
    }
}

/// Marker contents. The result file holds exactly the rows
/// `0..=last_processed_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub schema_version: u32,
    pub job_id: String,
    pub dimension: Dimension,
    pub last_processed_index: Option<usize>,
    pub rows: usize,
    /// RFC 3339 write time.
    pub timestamp: String,
    pub is_final: bool,
}

impl CheckpointState {
    /// Rows the result file must contain.
    pub fn expected_rows(&self) -> usize {
        self.last_processed_index.map_or(0, |index| index + 1)
    }
}

/// Persist `rows` and then the marker describing them.
pub fn write_checkpoint(
    paths: &CheckpointPaths,
    job_id: &str,
    dimension: Dimension,
    rows: &[ResultRow],
    is_final: bool,
) -> Result<CheckpointState> {
    let state = CheckpointState {
        schema_version: SCHEMA_VERSION,
        job_id: job_id.to_string(),
        dimension,
        last_processed_index: rows.len().checked_sub(1),
        rows: rows.len(),
        timestamp: chrono::Local::now().to_rfc3339(),
        is_final,
    };
    results::write_rows(&paths.results, rows)?;
    staging::write_atomic_json(&paths.marker, &state)?;
    tracing::debug!(
        job_id,
        rows = rows.len(),
        is_final,
        marker = %paths.marker.display(),
        "checkpoint written"
    );
    Ok(state)
}

pub fn load_marker(path: &Path) -> Result<CheckpointState> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let state: CheckpointState =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    if state.schema_version != SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported checkpoint schema_version {} in {}",
            state.schema_version,
            path.display()
        ));
    }
    Ok(state)
}

/// A reconciled checkpoint ready to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    pub state: CheckpointState,
    pub rows: Vec<ResultRow>,
}

/// Load the checkpoint pair, or `None` when either file is absent.
///
/// Rows beyond the marker are dropped. Fewer rows than the marker promises,
/// or rows out of input order, mean the pair is corrupt.
pub fn load_checkpoint(
    paths: &CheckpointPaths,
    job_id: &str,
    dimension: Dimension,
) -> Result<Option<Restored>> {
    if !paths.pair_exists() {
        return Ok(None);
    }
    let state = load_marker(&paths.marker)?;
    if state.job_id != job_id || state.dimension != dimension {
        return Err(anyhow!(
            "checkpoint {} belongs to {} job {}",
            paths.marker.display(),
            state.dimension,
            state.job_id
        ));
    }
    let mut rows = results::read_rows(&paths.results)?;
    let expected = state.expected_rows();
    if rows.len() < expected {
        return Err(anyhow!(
            "{} has {} rows but its marker records {}",
            paths.results.display(),
            rows.len(),
            expected
        ));
    }
    if rows.len() > expected {
        tracing::warn!(
            job_id,
            rows = rows.len(),
            expected,
            "result file ahead of checkpoint marker; truncating"
        );
        rows.truncate(expected);
    }
    if let Some((position, row)) = rows
        .iter()
        .enumerate()
        .find(|(position, row)| row.index != *position)
    {
        return Err(anyhow!(
            "{} row {} has index {}",
            paths.results.display(),
            position,
            row.index
        ));
    }
    Ok(Some(Restored { state, rows }))
}

/// Lifecycle of a job as seen from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    NotStarted,
    /// Marker present without the final flag: running, or abandoned.
    Incomplete(CheckpointState),
    Completed(CheckpointState),
}

pub fn job_status(paths: &CheckpointPaths) -> Result<JobStatus> {
    if !paths.marker.is_file() {
        return Ok(JobStatus::NotStarted);
    }
    let state = load_marker(&paths.marker)?;
    Ok(if state.is_final {
        JobStatus::Completed(state)
    } else {
        JobStatus::Incomplete(state)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::time::Duration;

    fn rows(count: usize) -> Vec<ResultRow> {
        (0..count)
            .map(|index| {
                let record = Record {
                    index,
                    permission_name: format!("Perm {index}"),
                    api_name: format!("Perm{index}"),
                    description: "d".to_string(),
                    expanded_description: None,
                };
                ResultRow::from_error(&record, Dimension::Risk, "x", Duration::ZERO)
            })
            .collect()
    }

    #[test]
    fn paths_follow_dimension_and_job_id() {
        let paths = CheckpointPaths::new(Path::new("data/checkpoints"), Dimension::Cloud, "20240101_120000");
        assert_eq!(
            paths.marker,
            PathBuf::from("data/checkpoints/cloud_20240101_120000.json")
        );
        assert_eq!(
            paths.results,
            PathBuf::from("data/checkpoints/cloud_20240101_120000.jsonl")
        );
    }

    #[test]
    fn written_checkpoint_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");

        let state = write_checkpoint(&paths, "job", Dimension::Risk, &rows(3), false).expect("write");
        assert_eq!(state.last_processed_index, Some(2));

        let restored = load_checkpoint(&paths, "job", Dimension::Risk)
            .expect("load")
            .expect("present");
        assert_eq!(restored.rows, rows(3));
        assert_eq!(restored.state, state);
        assert!(matches!(job_status(&paths).expect("status"), JobStatus::Incomplete(_)));
    }

    #[test]
    fn empty_checkpoint_has_no_last_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
        let state = write_checkpoint(&paths, "job", Dimension::Risk, &[], true).expect("write");
        assert_eq!(state.last_processed_index, None);
        assert_eq!(state.expected_rows(), 0);
        assert!(matches!(job_status(&paths).expect("status"), JobStatus::Completed(_)));
    }

    #[test]
    fn result_file_ahead_of_marker_is_truncated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
        write_checkpoint(&paths, "job", Dimension::Risk, &rows(2), false).expect("write");
        // Crash after the rows were replaced but before the marker was.
        results::write_rows(&paths.results, &rows(4)).expect("rows ahead");

        let restored = load_checkpoint(&paths, "job", Dimension::Risk)
            .expect("load")
            .expect("present");

        assert_eq!(restored.rows.len(), 2);
    }

    #[test]
    fn short_result_file_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
        write_checkpoint(&paths, "job", Dimension::Risk, &rows(3), false).expect("write");
        results::write_rows(&paths.results, &rows(1)).expect("rows behind");

        assert!(load_checkpoint(&paths, "job", Dimension::Risk).is_err());
    }

    #[test]
    fn missing_pair_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = CheckpointPaths::new(dir.path(), Dimension::Quality, "job");
        assert_eq!(load_checkpoint(&paths, "job", Dimension::Quality).expect("load"), None);
        assert_eq!(job_status(&paths).expect("status"), JobStatus::NotStarted);
    }

    #[test]
    fn foreign_marker_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
        write_checkpoint(&paths, "other", Dimension::Risk, &rows(1), false).expect("write");
        assert!(load_checkpoint(&paths, "job", Dimension::Risk).is_err());
    }
}
