//! Field extraction over a finished result table.
//!
//! Some prompts ask the model to answer with a JSON object inside the
//! rationale. This pass lifts selected keys of that object into their own
//! columns and normalizes the scraped expanded description.
use crate::record::EXPANDED_DESCRIPTION;
use crate::results::{ResultRow, EVALUATION};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub const DEFAULT_SOURCE_COLUMN: &str = EVALUATION;

/// `json_key -> column` pairs used when no map is given.
pub fn default_field_map() -> Vec<(String, String)> {
    [
        ("risk_rating_tier", "Risk Rating Tier"),
        ("risk_rating_score", "Risk Rating Score"),
        ("weighted_score", "Weighted Score"),
        ("scores", "Scores"),
        ("rationale", "Rationale"),
        ("confidence", "Confidence"),
    ]
    .into_iter()
    .map(|(key, column)| (key.to_string(), column.to_string()))
    .collect()
}

/// Remove markdown fences and line breaks so the object parses as one line.
pub fn clean_json_string(text: &str) -> String {
    text.replace("```json\n", "")
        .replace("\n```", "")
        .replace("```", "")
        .replace('\n', "")
}

/// Drop footnote markers such as `[1]` or ` [2, 3]`.
pub fn strip_citation_markers(text: &str) -> String {
    static CITATION: OnceLock<Regex> = OnceLock::new();
    let re = CITATION.get_or_init(|| {
        Regex::new(r"\s*\[\d+(?:\s*,\s*\d+)*\]").expect("regex for citation markers")
    });
    re.replace_all(text, "").into_owned()
}

/// Copy `field_map` keys from the JSON object in `source_column` into
/// columns of each row.
///
/// Every mapped column exists on every row afterwards. Rows whose source is
/// empty or not a JSON object are logged and keep empty values. Running the
/// pass twice gives the same table.
pub fn extract_fields(
    rows: &[ResultRow],
    source_column: &str,
    field_map: &[(String, String)],
) -> Vec<ResultRow> {
    let mut out = rows.to_vec();
    for row in &mut out {
        for (_, column) in field_map {
            if row.column(column).is_none() {
                row.set_column(column, String::new());
            }
        }

        let cleaned = row.column(source_column).map(clean_json_string);
        if let Some(cleaned) = &cleaned {
            row.set_column(source_column, cleaned.clone());
        }
        let Some(cleaned) = cleaned.filter(|text| !text.trim().is_empty()) else {
            tracing::warn!(index = row.index, column = source_column, "empty JSON source");
            continue;
        };

        match serde_json::from_str::<Map<String, Value>>(&cleaned) {
            Ok(object) => {
                for (key, column) in field_map {
                    row.set_column(column, cell_text(object.get(key)));
                }
            }
            Err(err) => {
                tracing::error!(
                    index = row.index,
                    column = source_column,
                    error = %err,
                    "cannot decode JSON source"
                );
                tracing::debug!(index = row.index, source = %cleaned, "problematic JSON");
            }
        }
    }

    for row in &mut out {
        if let Some(stripped) = row.column(EXPANDED_DESCRIPTION).map(strip_citation_markers) {
            row.set_column(EXPANDED_DESCRIPTION, stripped);
        }
    }
    tracing::info!(
        rows = out.len(),
        columns = field_map.len(),
        source = source_column,
        "field extraction complete"
    );
    out
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Parse a `key=Column` flag value.
pub fn parse_field_mapping(mapping: &str) -> Result<(String, String), String> {
    match mapping.split_once('=') {
        Some((key, column)) if !key.trim().is_empty() && !column.trim().is_empty() => {
            Ok((key.trim().to_string(), column.trim().to_string()))
        }
        _ => Err(format!("expected key=Column, got {mapping:?}")),
    }
}
