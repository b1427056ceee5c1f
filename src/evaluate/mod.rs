//! Per-record evaluation protocol.
//!
//! One free-text turn produces the rationale; one constrained follow-up per
//! rating slot converts it into a closed rating. Structured-output failures
//! never abort a record: they degrade to a keyword scan of the rationale.
mod dimension;
mod fidelity;

pub use dimension::{Dimension, RatingSlot};
pub use fidelity::render_full_fidelity;

use crate::backend::GroundingMetadata;
use crate::error::EvalError;
use crate::ratings::{RatingSource, RatingValue};
use crate::record::Record;
use crate::session::{SendOptions, Session, SessionFactory};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::{Duration, Instant};

/// Attempts for a grounded first turn before the record fails.
pub const DEFAULT_GROUNDING_MAX_ATTEMPTS: u32 = 5;

/// Prompt text with `{permission_*}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read prompt template {}", path.display()))?;
        Ok(Self::new(text))
    }

    /// Fill the placeholders for one record.
    ///
    /// The expanded description is only offered to dimensions that use it;
    /// otherwise, and when the record has none, it renders empty.
    pub fn render(&self, record: &Record, dimension: Dimension) -> String {
        let expanded = if dimension.uses_expanded_description() {
            record.expanded_description.as_deref().unwrap_or("")
        } else {
            ""
        };
        self.text
            .replace("{permission_name}", &record.permission_name)
            .replace("{permission_api_name}", &record.api_name)
            .replace("{permission_description}", &record.description)
            .replace("{permission_expanded_description}", expanded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluateOptions {
    pub grounding_max_attempts: u32,
    pub full_fidelity: bool,
}

impl EvaluateOptions {
    pub fn for_dimension(dimension: Dimension) -> Self {
        Self {
            grounding_max_attempts: DEFAULT_GROUNDING_MAX_ATTEMPTS,
            full_fidelity: dimension.full_fidelity(),
        }
    }
}

/// One resolved rating column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRating {
    pub column: &'static str,
    pub value: RatingValue,
    pub source: RatingSource,
}

/// Outcome of evaluating one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub rationale: String,
    pub ratings: Vec<SlotRating>,
    pub full_fidelity: Option<String>,
    pub duration: Duration,
}

impl Evaluation {
    pub fn fallback_count(&self) -> usize {
        self.ratings
            .iter()
            .filter(|rating| rating.source == RatingSource::Fallback)
            .count()
    }
}

/// Evaluate one record along `dimension`.
///
/// Uses `session` when given so context accumulates across records;
/// otherwise a fresh session is created from `factory`. Supplying neither is
/// a configuration error raised before any remote call.
pub fn evaluate(
    template: &PromptTemplate,
    record: &Record,
    dimension: Dimension,
    session: Option<&mut Session>,
    factory: Option<&SessionFactory>,
    options: &EvaluateOptions,
) -> Result<Evaluation, EvalError> {
    let mut fresh;
    let session: &mut Session = match (session, factory) {
        (Some(session), _) => session,
        (None, Some(factory)) => {
            fresh = factory.create_session()?;
            &mut fresh
        }
        (None, None) => {
            return Err(EvalError::config(
                "evaluation needs a session or a session factory",
            ))
        }
    };

    let start = Instant::now();
    let prompt = template.render(record, dimension);

    let (rationale, grounding) = if dimension.requires_grounding() {
        let (text, grounding) = grounded_turn(session, &prompt, options.grounding_max_attempts)?;
        (text, Some(grounding))
    } else {
        let response = session.send(&prompt, &SendOptions::default())?;
        (response.text, response.grounding)
    };

    let ratings = dimension
        .slots()
        .iter()
        .map(|slot| resolve_slot(session, slot, &rationale, record.index))
        .collect();

    let full_fidelity = match (&grounding, options.full_fidelity) {
        (Some(grounding), true) => Some(render_full_fidelity(&rationale, grounding)),
        _ => None,
    };

    Ok(Evaluation {
        rationale,
        ratings,
        full_fidelity,
        duration: start.elapsed(),
    })
}

fn grounded_turn(
    session: &mut Session,
    prompt: &str,
    max_attempts: u32,
) -> Result<(String, GroundingMetadata), EvalError> {
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let response = session.send(prompt, &SendOptions::grounded())?;
        match response.grounding {
            Some(grounding) if grounding.is_complete() => return Ok((response.text, grounding)),
            _ => {
                session.discard_last_exchange();
                tracing::warn!(attempt, max_attempts = attempts, "grounding metadata incomplete");
            }
        }
    }
    Err(EvalError::IncompleteGrounding { attempts })
}

fn resolve_slot(
    session: &mut Session,
    slot: &RatingSlot,
    rationale: &str,
    index: usize,
) -> SlotRating {
    let tags = slot.family.tags();
    let structured = match session.send(slot.instruction, &SendOptions::constrained(&tags)) {
        Ok(response) => {
            let raw = response.parsed.as_deref().unwrap_or(&response.text).trim();
            let value = slot.family.from_tag(raw);
            if value.is_none() {
                tracing::warn!(
                    index,
                    column = slot.column,
                    value = raw,
                    "follow-up returned an illegal tag; using keyword fallback"
                );
            }
            value
        }
        Err(err) => {
            tracing::warn!(
                index,
                column = slot.column,
                error = %err,
                "follow-up failed; using keyword fallback"
            );
            None
        }
    };

    match structured {
        Some(value) => SlotRating {
            column: slot.column,
            value,
            source: RatingSource::Structured,
        },
        None => SlotRating {
            column: slot.column,
            value: slot.family.fallback(rationale),
            source: RatingSource::Fallback,
        },
    }
}

#[cfg(test)]
#[path = "evaluate_tests.rs"]
mod tests;
