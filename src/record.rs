//! Input table and the permission records read from it.
//!
//! The table is the scraper's output: a JSON array of objects, or JSON
//! Lines, keyed by human-readable column names.
use crate::error::EvalError;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub const PERMISSION_NAME: &str = "Permission Name";
pub const API_NAME: &str = "API Name";
pub const DESCRIPTION: &str = "Description";
pub const EXPANDED_DESCRIPTION: &str = "Expanded Description";

/// Columns every input table must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = [PERMISSION_NAME, API_NAME, DESCRIPTION];

/// One permission to classify. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position in the input table.
    pub index: usize,
    pub permission_name: String,
    pub api_name: String,
    pub description: String,
    pub expanded_description: Option<String>,
}

/// Rows exactly as loaded, before column validation.
#[derive(Debug, Clone, Default)]
pub struct InputTable {
    rows: Vec<Map<String, Value>>,
}

impl InputTable {
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Required columns absent from any row, in declaration order.
    pub fn missing_columns(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .filter(|column| self.rows.iter().any(|row| !row.contains_key(**column)))
            .map(|column| (*column).to_string())
            .collect()
    }

    /// Validate columns and convert every row.
    pub fn records(&self) -> Result<Vec<Record>, EvalError> {
        let missing = self.missing_columns();
        if !missing.is_empty() {
            return Err(EvalError::MissingColumns(missing));
        }
        Ok(self
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| Record {
                index,
                permission_name: cell(row, PERMISSION_NAME).unwrap_or_default(),
                api_name: cell(row, API_NAME).unwrap_or_default(),
                description: cell(row, DESCRIPTION).unwrap_or_default(),
                expanded_description: cell(row, EXPANDED_DESCRIPTION),
            })
            .collect())
    }
}

fn cell(row: &Map<String, Value>, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Load a JSON array or JSON Lines file.
pub fn load_input_table(path: &Path) -> Result<InputTable> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read input table {}", path.display()))?;
    parse_input_table(&text).with_context(|| format!("parse input table {}", path.display()))
}

fn parse_input_table(text: &str) -> Result<InputTable> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(InputTable::default());
    }
    if trimmed.starts_with('[') {
        let rows: Vec<Map<String, Value>> =
            serde_json::from_str(trimmed).context("parse JSON array of objects")?;
        return Ok(InputTable::from_rows(rows));
    }
    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: Map<String, Value> = serde_json::from_str(line)
            .with_context(|| format!("parse JSON Lines row at line {}", line_no + 1))?;
        rows.push(row);
    }
    Ok(InputTable::from_rows(rows))
}
