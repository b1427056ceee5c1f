use super::*;
use crate::backend::BackendError;
use crate::checkpoint::{load_marker, JobStatus};
use crate::evaluate::SlotRating;
use crate::ratings::{RatingFamily, RatingSource};
use crate::results::{read_rows, ERROR_MARKER};
use serde_json::{json, Map, Value};
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

fn table(count: usize) -> InputTable {
    let rows = (0..count)
        .map(|index| match json!({
            "Permission Name": format!("Permission {index}"),
            "API Name": format!("Permission{index}"),
            "Description": format!("Grants capability {index}."),
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        })
        .collect();
    InputTable::from_rows(rows)
}

fn options(dir: &Path, interval: usize) -> JobOptions {
    JobOptions {
        job_id: Some("job".to_string()),
        checkpoint_interval: interval,
        ..JobOptions::new(Dimension::Risk, dir.to_path_buf())
    }
}

fn resumed(dir: &Path, interval: usize) -> JobOptions {
    JobOptions {
        resume: true,
        ..options(dir, interval)
    }
}

fn canned(record: &Record) -> Evaluation {
    Evaluation {
        rationale: format!("{} is controlled.", record.permission_name),
        ratings: vec![SlotRating {
            column: "Risk Rating",
            value: RatingFamily::Risk.from_string("2"),
            source: RatingSource::Structured,
        }],
        full_fidelity: None,
        duration: Duration::from_millis(5),
    }
}

#[test]
fn fresh_run_evaluates_every_record_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Cell::new(0);

    let outcome = run_job(&table(5), &options(dir.path(), 2), |record| {
        calls.set(calls.get() + 1);
        Ok(canned(record))
    })
    .expect("run");

    assert_eq!(calls.get(), 5);
    let indices: Vec<usize> = outcome.rows.iter().map(|row| row.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(outcome.summary.processed, 5);
    let marker = load_marker(&outcome.paths.marker).expect("marker");
    assert!(marker.is_final);
    assert_eq!(marker.last_processed_index, Some(4));
    assert_eq!(read_rows(&outcome.paths.results).expect("rows"), outcome.rows);
}

#[test]
fn resuming_a_completed_job_evaluates_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = run_job(&table(4), &options(dir.path(), 3), |record| Ok(canned(record)))
        .expect("first run");

    let calls = Cell::new(0);
    let second = run_job(&table(4), &resumed(dir.path(), 3), |record| {
        calls.set(calls.get() + 1);
        Ok(canned(record))
    })
    .expect("second run");

    assert_eq!(calls.get(), 0);
    assert_eq!(second.rows, first.rows);
    assert_eq!(second.summary.resumed, 4);
}

#[test]
fn crash_at_interval_boundary_resumes_without_rework() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        run_job(&table(7), &options(dir.path(), 2), |record| {
            if record.index == 4 {
                panic!("simulated kill");
            }
            Ok(canned(record))
        })
    }));
    assert!(crashed.is_err());

    let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
    let marker = load_marker(&paths.marker).expect("marker");
    assert_eq!(marker.last_processed_index, Some(3));
    assert!(!marker.is_final);

    let mut seen = Vec::new();
    let outcome = run_job(&table(7), &resumed(dir.path(), 2), |record| {
        seen.push(record.index);
        Ok(canned(record))
    })
    .expect("resume");

    assert_eq!(seen, vec![4, 5, 6]);
    assert_eq!(outcome.rows.len(), 7);
}

#[test]
fn three_record_kill_and_resume_keeps_first_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut first_rows = Vec::new();
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        run_job(&table(3), &options(dir.path(), 1), |record| {
            if record.index == 1 {
                first_rows = read_rows(&CheckpointPaths::new(dir.path(), Dimension::Risk, "job").results)
                    .expect("checkpointed rows");
                panic!("simulated kill");
            }
            Ok(canned(record))
        })
    }));
    assert!(crashed.is_err());
    assert_eq!(first_rows.len(), 1);

    let calls = Cell::new(0);
    let outcome = run_job(&table(3), &resumed(dir.path(), 1), |record| {
        calls.set(calls.get() + 1);
        Ok(canned(record))
    })
    .expect("resume");

    assert_eq!(calls.get(), 2);
    assert_eq!(outcome.rows.len(), 3);
    assert_eq!(outcome.rows[0], first_rows[0]);
}

#[test]
fn failing_record_becomes_error_row_and_job_continues() {
    let dir = tempfile::tempdir().expect("tempdir");

    let outcome = run_job(&table(4), &options(dir.path(), 10), |record| {
        if record.index == 2 {
            return Err(BackendError::Status {
                status: 500,
                message: "internal".to_string(),
            }
            .into());
        }
        Ok(canned(record))
    })
    .expect("run");

    assert_eq!(outcome.rows.len(), 4);
    let failed = &outcome.rows[2];
    assert_eq!(failed.column("Risk Rating"), Some(ERROR_MARKER));
    assert!(failed.evaluation.starts_with("Error: "));
    assert!(failed.evaluation.contains("internal"));
    assert_eq!(outcome.rows[3].column("Risk Rating"), Some("CONTROLLED"));
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.summary.processed, 4);
}

#[test]
fn failure_forces_a_checkpoint_off_interval() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        run_job(&table(5), &options(dir.path(), 100), |record| match record.index {
            1 => Err(EvalError::IncompleteGrounding { attempts: 5 }),
            2 => panic!("simulated kill"),
            _ => Ok(canned(record)),
        })
    }));
    assert!(crashed.is_err());

    let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
    let marker = load_marker(&paths.marker).expect("marker");
    assert_eq!(marker.rows, 2);
}

#[test]
fn missing_columns_fail_before_any_evaluation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut row = Map::new();
    row.insert("Permission Name".to_string(), json!("View Setup"));
    let bad = InputTable::from_rows(vec![row]);
    let calls = Cell::new(0);

    let err = run_job(&bad, &options(dir.path(), 1), |record| {
        calls.set(calls.get() + 1);
        Ok(canned(record))
    })
    .unwrap_err();

    assert_eq!(calls.get(), 0);
    assert!(err.to_string().contains("API Name, Description"));
}

#[test]
fn configuration_error_stops_the_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Cell::new(0);

    let err = run_job(&table(3), &options(dir.path(), 10), |record| {
        calls.set(calls.get() + 1);
        if record.index == 1 {
            return Err(EvalError::config("evaluation needs a session or a session factory"));
        }
        Ok(canned(record))
    })
    .unwrap_err();

    assert_eq!(calls.get(), 2);
    assert!(matches!(
        err.downcast_ref::<EvalError>(),
        Some(EvalError::Config(_))
    ));
    assert!(format!("{err:#}").contains("needs a session"));

    let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
    let marker = load_marker(&paths.marker).expect("marker");
    assert_eq!(marker.rows, 1);
    assert!(!marker.is_final);
}

#[test]
fn configuration_error_on_first_record_evaluates_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Cell::new(0);

    let result = run_job(&table(3), &options(dir.path(), 1), |_| {
        calls.set(calls.get() + 1);
        Err(EvalError::config("no session"))
    });

    assert!(result.is_err());
    assert_eq!(calls.get(), 1);
}

#[test]
fn corrupt_checkpoint_restarts_from_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
    std::fs::write(&paths.marker, "{ not json").expect("write marker");
    std::fs::write(&paths.results, "").expect("write results");
    let calls = Cell::new(0);

    let outcome = run_job(&table(3), &resumed(dir.path(), 1), |record| {
        calls.set(calls.get() + 1);
        Ok(canned(record))
    })
    .expect("run");

    assert_eq!(calls.get(), 3);
    assert_eq!(outcome.summary.resumed, 0);
}

#[test]
fn limit_is_clamped_to_table_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut opts = options(dir.path(), 1);
    opts.limit = Some(10);
    let outcome = run_job(&table(3), &opts, |record| Ok(canned(record))).expect("run");
    assert_eq!(outcome.rows.len(), 3);

    let dir = tempfile::tempdir().expect("tempdir");
    let mut opts = options(dir.path(), 1);
    opts.limit = Some(2);
    let outcome = run_job(&table(3), &opts, |record| Ok(canned(record))).expect("run");
    assert_eq!(outcome.rows.len(), 2);
}

#[test]
fn checkpoint_write_failures_follow_strictness() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = CheckpointPaths::new(dir.path(), Dimension::Risk, "job");
    // A directory squatting on the result path makes every rename fail.
    std::fs::create_dir_all(&paths.results).expect("block results path");

    let outcome = run_job(&table(2), &options(dir.path(), 1), |record| Ok(canned(record)))
        .expect("lenient run completes");
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(
        checkpoint::job_status(&paths).expect("status"),
        JobStatus::NotStarted
    );

    let mut strict = options(dir.path(), 1);
    strict.strict_checkpoints = true;
    let err = run_job(&table(2), &strict, |record| Ok(canned(record))).unwrap_err();
    assert!(format!("{err:#}").contains("write checkpoint"));
}

#[test]
fn zero_interval_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = run_job(&table(1), &options(dir.path(), 0), |record| Ok(canned(record))).unwrap_err();
    assert!(err.to_string().contains("checkpoint_interval"));
}

#[test]
fn generated_job_id_is_a_timestamp() {
    let id = resolve_job_id(None);
    assert_eq!(id.len(), 15);
    assert_eq!(id.as_bytes()[8], b'_');
    assert!(id.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    assert_eq!(resolve_job_id(Some(" nightly ")), "nightly");
}

#[test]
fn average_time_divides_by_processed() {
    let summary = JobSummary {
        processed: 4,
        total_time: Duration::from_millis(400),
        ..JobSummary::default()
    };
    assert_eq!(summary.average_time(), Duration::from_millis(100));
    assert_eq!(JobSummary::default().average_time(), Duration::ZERO);
}
