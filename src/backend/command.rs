//! Local command backend.
//!
//! Delegates generation to a user-configured command instead of a hosted
//! API. The command receives the request as one JSON object on stdin and
//! must print a JSON response on stdout:
//!
//! ```text
//! stdin:  {"model":"...","turns":[{"role":"user","text":"..."}],"response_enum":["5","4"]}
//! stdout: {"text":"4","parsed":"4"}
//! ```
//!
//! A command can report a transient failure the same way an HTTP API would:
//!
//! ```text
//! {"error":{"status":429,"message":"slow down"}}
//! ```
//!
//! Markdown code fences around the JSON are tolerated.
use super::{BackendError, GenerateRequest, GenerateResponse, ModelBackend};
use serde::Deserialize;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

/// Invokes an external command per generate call.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    argv: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    error: Option<CommandErrorReply>,
    #[serde(flatten)]
    response: GenerateResponse,
}

#[derive(Debug, Deserialize)]
struct CommandErrorReply {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: String,
}

impl CommandBackend {
    /// Parse a shell-style command line.
    pub fn new(command: &str) -> Result<Self, BackendError> {
        let argv = shell_words::split(command)
            .map_err(|err| BackendError::Config(format!("parse LM command {command:?}: {err}")))?;
        if argv.is_empty() {
            return Err(BackendError::Config("LM command is empty".to_string()));
        }
        Ok(Self { argv })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

impl ModelBackend for CommandBackend {
    fn name(&self) -> &'static str {
        "command"
    }

    fn generate(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse, BackendError> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| BackendError::Malformed(format!("serialize request: {err}")))?;

        let start = Instant::now();
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BackendError::Transport(format!("spawn {}: {err}", self.argv[0])))?;

        // The command may fill stdout before it drains stdin.
        let bytes = payload.as_slice();
        let (written, output) = thread::scope(|scope| {
            let writer = child
                .stdin
                .take()
                .map(|mut stdin| scope.spawn(move || stdin.write_all(bytes)));
            let output = child.wait_with_output();
            let written = match writer {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (written, output)
        });
        let output =
            output.map_err(|err| BackendError::Transport(format!("wait for LM command: {err}")))?;

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            request_bytes = payload.len(),
            response_bytes = output.stdout.len(),
            "lm command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Transport(format!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        written.map_err(|err| BackendError::Transport(format!("write LM stdin: {err}")))?;

        let stdout = String::from_utf8(output.stdout)
            .map_err(|err| BackendError::Malformed(format!("decode LM stdout as UTF-8: {err}")))?;
        parse_reply(&stdout)
    }
}

fn parse_reply(text: &str) -> Result<GenerateResponse, BackendError> {
    let json_text = extract_json(text);
    let reply: CommandReply = serde_json::from_str(json_text).map_err(|err| {
        BackendError::Malformed(format!(
            "parse LM reply: {err}; first 200 chars: {}",
            &text[..floor_char_boundary(text, 200)]
        ))
    })?;
    if let Some(error) = reply.error {
        return Err(match error.status {
            Some(status) => BackendError::Status {
                status,
                message: error.message,
            },
            None => BackendError::Transport(error.message),
        });
    }
    Ok(reply.response)
}

/// Extract JSON from text that might have markdown code fences.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip language identifier if present
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut idx = max;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
