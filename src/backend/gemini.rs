//! Gemini `generateContent` client over blocking HTTP.
use super::{
    BackendError, GenerateRequest, GenerateResponse, GroundingChunk, GroundingMetadata,
    GroundingSupport, ModelBackend, Role,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Calls the hosted Gemini API.
pub struct GeminiBackend {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        if api_key.trim().is_empty() {
            return Err(BackendError::Config("Gemini API key is empty".to_string()));
        }
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Ok(Self {
            agent: config.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }
}

impl ModelBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse, BackendError> {
        let body = request_body(request);
        let start = Instant::now();
        let mut response = self
            .agent
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", &self.api_key)
            .send_json(&body)
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|err| BackendError::Transport(format!("read response body: {err}")))?;

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            status,
            model = request.model,
            search = request.search,
            "gemini call complete"
        );

        if !(200..300).contains(&status) {
            return Err(BackendError::Status {
                status,
                message: error_message(&text),
            });
        }
        parse_response(&text, request.response_enum.is_some())
    }
}

fn request_body(request: &GenerateRequest<'_>) -> Value {
    let contents: Vec<Value> = request
        .turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.text }] })
        })
        .collect();

    let mut generation = serde_json::Map::new();
    if let Some(temperature) = request.temperature {
        generation.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(values) = request.response_enum {
        generation.insert("responseMimeType".to_string(), json!("text/x.enum"));
        generation.insert(
            "responseSchema".to_string(),
            json!({ "type": "STRING", "format": "enum", "enum": values }),
        );
    }

    let mut body = json!({ "contents": contents });
    if request.search {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    if !generation.is_empty() {
        body["generationConfig"] = Value::Object(generation);
    }
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    grounding_metadata: Option<WireGrounding>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGrounding {
    #[serde(default)]
    grounding_chunks: Vec<WireChunk>,
    #[serde(default)]
    grounding_supports: Vec<WireSupport>,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    web: Option<WireWeb>,
}

#[derive(Debug, Deserialize)]
struct WireWeb {
    #[serde(default)]
    title: String,
    #[serde(default)]
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSupport {
    #[serde(default)]
    segment: WireSegment,
    #[serde(default)]
    grounding_chunk_indices: Vec<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSegment {
    #[serde(default)]
    start_index: usize,
    #[serde(default)]
    end_index: usize,
}

fn parse_response(body: &str, constrained: bool) -> Result<GenerateResponse, BackendError> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|err| BackendError::Malformed(format!("parse Gemini response: {err}")))?;
    let Some(candidate) = wire.candidates.into_iter().next() else {
        return Err(BackendError::Malformed("response has no candidates".to_string()));
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let grounding = candidate.grounding_metadata.map(|meta| GroundingMetadata {
        chunks: meta
            .grounding_chunks
            .into_iter()
            .filter_map(|chunk| chunk.web)
            .map(|web| GroundingChunk {
                title: web.title,
                uri: web.uri,
            })
            .collect(),
        supports: meta
            .grounding_supports
            .into_iter()
            .map(|support| GroundingSupport {
                start: support.segment.start_index,
                end: support.segment.end_index,
                chunk_indices: support.grounding_chunk_indices,
            })
            .collect(),
    });

    let parsed = if constrained && !text.trim().is_empty() {
        Some(text.trim().to_string())
    } else {
        None
    };

    Ok(GenerateResponse {
        text,
        parsed,
        grounding,
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}
