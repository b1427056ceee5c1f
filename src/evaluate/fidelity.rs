//! Markdown rendering of a grounded answer with footnoted support spans.
use crate::backend::GroundingMetadata;

const RULE: &str = "\n----\n";

/// Annotate `text` with its citations.
///
/// Support offsets are byte offsets into `text`; a span that does not land
/// on valid boundaries is skipped rather than guessed at. Chunk references
/// are rendered 1-based.
pub fn render_full_fidelity(text: &str, grounding: &GroundingMetadata) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push_str(text);
    out.push_str(RULE);
    out.push_str("Supported text:\n\n");
    for support in &grounding.supports {
        let Some(span) = text.get(support.start..support.end) else {
            tracing::debug!(
                start = support.start,
                end = support.end,
                "support span outside answer text"
            );
            continue;
        };
        out.push_str(" * ");
        out.push_str(span);
        for index in &support.chunk_indices {
            out.push_str(&format!("<sup>[{}]</sup>", index + 1));
        }
        out.push_str("\n\n");
    }
    out.push_str(RULE);
    out.push_str("Citations:\n\n");
    for (number, chunk) in grounding.chunks.iter().enumerate() {
        out.push_str(&format!("{}. [{}]({})\n", number + 1, chunk.title, chunk.uri));
    }
    out.push_str(RULE);
    out
}
