//! Result rows and their JSON Lines table format.
//!
//! Each input record yields exactly one row per attempt: a rated row, or an
//! error row with `ERROR` in every rating column.
use crate::evaluate::{Dimension, Evaluation};
use crate::ratings::RatingSource;
use crate::record::{self, Record};
use crate::staging;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Rating cell value for records whose evaluation failed.
pub const ERROR_MARKER: &str = "ERROR";
pub const EVALUATION: &str = "Evaluation";
pub const FULL_FIDELITY: &str = "Full Fidelity Evaluation";

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub index: usize,
    pub dimension: Dimension,
    pub permission_name: String,
    pub api_name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_description: Option<String>,
    /// Rationale, or `Error: <message>` for failed records.
    pub evaluation: String,
    /// Rating column label to member name.
    #[serde(default)]
    pub ratings: BTreeMap<String, String>,
    #[serde(default)]
    pub rating_sources: BTreeMap<String, RatingSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_fidelity: Option<String>,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Columns added by field extraction.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extracted: BTreeMap<String, String>,
}

impl ResultRow {
    pub fn from_evaluation(record: &Record, dimension: Dimension, evaluation: &Evaluation) -> Self {
        let mut row = Self::identity(record, dimension);
        row.evaluation = evaluation.rationale.clone();
        for rating in &evaluation.ratings {
            row.ratings
                .insert(rating.column.to_string(), rating.value.name.to_string());
            row.rating_sources
                .insert(rating.column.to_string(), rating.source);
        }
        row.full_fidelity = evaluation.full_fidelity.clone();
        row.processing_time_ms = millis(evaluation.duration);
        row
    }

    pub fn from_error(
        record: &Record,
        dimension: Dimension,
        message: &str,
        elapsed: Duration,
    ) -> Self {
        let mut row = Self::identity(record, dimension);
        row.evaluation = format!("Error: {message}");
        for slot in dimension.slots() {
            row.ratings
                .insert(slot.column.to_string(), ERROR_MARKER.to_string());
        }
        row.processing_time_ms = millis(elapsed);
        row.error = Some(message.to_string());
        row
    }

    fn identity(record: &Record, dimension: Dimension) -> Self {
        Self {
            index: record.index,
            dimension,
            permission_name: record.permission_name.clone(),
            api_name: record.api_name.clone(),
            description: record.description.clone(),
            expanded_description: record.expanded_description.clone(),
            evaluation: String::new(),
            ratings: BTreeMap::new(),
            rating_sources: BTreeMap::new(),
            full_fidelity: None,
            processing_time_ms: 0,
            error: None,
            extracted: BTreeMap::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Look up a cell by its column label.
    pub fn column(&self, name: &str) -> Option<&str> {
        match name {
            record::PERMISSION_NAME => Some(&self.permission_name),
            record::API_NAME => Some(&self.api_name),
            record::DESCRIPTION => Some(&self.description),
            record::EXPANDED_DESCRIPTION => self.expanded_description.as_deref(),
            EVALUATION => Some(&self.evaluation),
            FULL_FIDELITY => self.full_fidelity.as_deref(),
            other => self
                .ratings
                .get(other)
                .or_else(|| self.extracted.get(other))
                .map(String::as_str),
        }
    }

    /// Overwrite a cell; unknown labels become extracted columns.
    pub fn set_column(&mut self, name: &str, value: String) {
        match name {
            record::PERMISSION_NAME => self.permission_name = value,
            record::API_NAME => self.api_name = value,
            record::DESCRIPTION => self.description = value,
            record::EXPANDED_DESCRIPTION => self.expanded_description = Some(value),
            EVALUATION => self.evaluation = value,
            FULL_FIDELITY => self.full_fidelity = Some(value),
            other => {
                if let Some(cell) = self.ratings.get_mut(other) {
                    *cell = value;
                } else {
                    self.extracted.insert(other.to_string(), value);
                }
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Read a JSON Lines result table.
pub fn read_rows(path: &Path) -> Result<Vec<ResultRow>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read results {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str(line).with_context(|| {
                format!("parse result row at {}:{}", path.display(), line_no + 1)
            })
        })
        .collect()
}

/// Write a JSON Lines result table atomically.
pub fn write_rows(path: &Path, rows: &[ResultRow]) -> Result<()> {
    let mut bytes = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut bytes, row).context("serialize result row")?;
        bytes.push(b'\n');
    }
    staging::write_atomic_bytes(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::SlotRating;
    use crate::ratings::RatingFamily;

    fn record() -> Record {
        Record {
            index: 3,
            permission_name: "Manage Users".to_string(),
            api_name: "ManageUsers".to_string(),
            description: "Create and edit users.".to_string(),
            expanded_description: None,
        }
    }

    #[test]
    fn error_row_marks_every_rating_column() {
        let row = ResultRow::from_error(
            &record(),
            Dimension::Category,
            "status 500: internal",
            Duration::from_millis(1500),
        );

        assert_eq!(row.evaluation, "Error: status 500: internal");
        assert_eq!(row.column("Category Rating"), Some(ERROR_MARKER));
        assert_eq!(row.column("Category Label"), Some(ERROR_MARKER));
        assert_eq!(row.processing_time_ms, 1500);
        assert!(row.is_error());
    }

    #[test]
    fn evaluation_row_records_names_and_sources() {
        let evaluation = Evaluation {
            rationale: "Security admin territory.".to_string(),
            ratings: vec![SlotRating {
                column: "Risk Rating",
                value: RatingFamily::Risk.from_string("4"),
                source: RatingSource::Fallback,
            }],
            full_fidelity: None,
            duration: Duration::from_millis(20),
        };

        let row = ResultRow::from_evaluation(&record(), Dimension::Risk, &evaluation);

        assert_eq!(row.column("Risk Rating"), Some("RESTRICTED"));
        assert_eq!(row.rating_sources["Risk Rating"], RatingSource::Fallback);
        assert_eq!(row.column(EVALUATION), Some("Security admin territory."));
        assert!(!row.is_error());
    }

    #[test]
    fn set_column_routes_unknown_labels_to_extracted() {
        let mut row = ResultRow::from_error(&record(), Dimension::Risk, "x", Duration::ZERO);
        row.set_column("Confidence", "0.9".to_string());
        row.set_column("Risk Rating", "GENERAL".to_string());

        assert_eq!(row.extracted.get("Confidence").map(String::as_str), Some("0.9"));
        assert_eq!(row.column("Risk Rating"), Some("GENERAL"));
    }

    #[test]
    fn rows_survive_a_jsonl_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rows.jsonl");
        let rows = vec![
            ResultRow::from_error(&record(), Dimension::Cloud, "boom", Duration::from_millis(4)),
        ];

        write_rows(&path, &rows).expect("write");

        assert_eq!(read_rows(&path).expect("read"), rows);
    }
}
