//! Conversational sessions over a retrying backend.
//!
//! A [`SessionFactory`] owns the one retry layer for every session it
//! creates. A [`Session`] is an explicit turn log: callers can inspect it,
//! and a failed call never leaves a dangling user turn behind.
use crate::backend::{
    GenerateRequest, GenerateResponse, ModelBackend, RetryPolicy, RetryingBackend, Turn,
};
use crate::error::EvalError;
use std::rc::Rc;

/// Builds sessions that share one retry-wrapped backend.
#[derive(Clone)]
pub struct SessionFactory {
    backend: Rc<dyn ModelBackend>,
    model: String,
}

impl SessionFactory {
    /// Wraps `backend` with `policy`. The wrapper is applied here and only here.
    pub fn new(
        backend: impl ModelBackend + 'static,
        model: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend: Rc::new(RetryingBackend::new(backend, policy)),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Start an empty conversation.
    pub fn create_session(&self) -> Result<Session, EvalError> {
        if self.model.trim().is_empty() {
            return Err(EvalError::config("model name is empty"));
        }
        Ok(Session {
            backend: Rc::clone(&self.backend),
            model: self.model.clone(),
            turns: Vec::new(),
        })
    }
}

/// Build one session with the default retry policy.
pub fn create_session(
    client: impl ModelBackend + 'static,
    model: &str,
) -> Result<Session, EvalError> {
    SessionFactory::new(client, model, RetryPolicy::default()).create_session()
}

/// Per-call options for [`Session::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub search: bool,
    pub temperature: Option<f32>,
    pub response_enum: Option<Vec<String>>,
}

impl SendOptions {
    /// Constrain the answer to the given tags.
    pub fn constrained(tags: &[&str]) -> Self {
        Self {
            response_enum: Some(tags.iter().map(|tag| (*tag).to_string()).collect()),
            ..Self::default()
        }
    }

    /// Search-augmented call at temperature 0.
    pub fn grounded() -> Self {
        Self {
            search: true,
            temperature: Some(0.0),
            ..Self::default()
        }
    }
}

/// Ordered request/response log with a backend.
pub struct Session {
    backend: Rc<dyn ModelBackend>,
    model: String,
    turns: Vec<Turn>,
}

impl Session {
    /// Send one prompt. History grows by two turns on success and is
    /// unchanged on failure.
    pub fn send(
        &mut self,
        prompt: &str,
        options: &SendOptions,
    ) -> Result<GenerateResponse, EvalError> {
        self.turns.push(Turn::user(prompt));
        let result = {
            let request = GenerateRequest {
                model: &self.model,
                turns: &self.turns,
                search: options.search,
                temperature: options.temperature,
                response_enum: options.response_enum.as_deref(),
            };
            self.backend.generate(&request)
        };
        match result {
            Ok(response) => {
                self.turns.push(Turn::model(response.text.clone()));
                Ok(response)
            }
            Err(err) => {
                self.turns.pop();
                Err(err.into())
            }
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Drop the most recent user/model pair, e.g. a rejected grounded answer.
    pub fn discard_last_exchange(&mut self) {
        let keep = self.turns.len().saturating_sub(2);
        self.turns.truncate(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::backend::{BackendError, Role};
    use std::time::Duration;

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn empty_model_is_a_configuration_error() {
        let factory = SessionFactory::new(ScriptedBackend::new(), " ", no_wait());
        let err = factory.create_session().err().expect("empty model rejected");
        assert!(err.is_fatal());
    }

    #[test]
    fn history_accumulates_prior_turns() {
        let scripted = ScriptedBackend::new();
        scripted.reply_text("first answer").reply_text("5");
        let factory = SessionFactory::new(scripted.clone(), "m", no_wait());
        let mut session = factory.create_session().expect("session");

        session.send("evaluate", &SendOptions::default()).expect("first");
        session
            .send("convert", &SendOptions::constrained(&["5", "4"]))
            .expect("second");

        let seen = scripted.seen();
        assert_eq!(seen[1].turns.len(), 3);
        assert_eq!(seen[1].turns[1].text, "first answer");
        assert_eq!(seen[1].response_enum, Some(vec!["5".to_string(), "4".to_string()]));
        assert_eq!(session.turns().len(), 4);
        assert_eq!(session.turns()[3].role, Role::Model);
    }

    #[test]
    fn failed_call_leaves_history_unchanged() {
        let scripted = ScriptedBackend::new();
        scripted
            .reply_text("ok")
            .fail(BackendError::Malformed("garbage".to_string()));
        let mut session = SessionFactory::new(scripted, "m", no_wait())
            .create_session()
            .expect("session");

        session.send("one", &SendOptions::default()).expect("first");
        let before = session.turns().to_vec();
        assert!(session.send("two", &SendOptions::default()).is_err());

        assert_eq!(session.turns(), before.as_slice());
    }

    #[test]
    fn sessions_share_a_single_retry_layer() {
        let scripted = ScriptedBackend::new();
        for _ in 0..2 {
            scripted.fail(BackendError::Status {
                status: 429,
                message: "slow down".to_string(),
            });
        }
        scripted.reply_text("a").reply_text("b");
        let factory = SessionFactory::new(scripted.clone(), "m", no_wait());
        let mut first = factory.create_session().expect("session");
        let mut second = factory.create_session().expect("session");

        first.send("x", &SendOptions::default()).expect("retried");
        second.send("y", &SendOptions::default()).expect("direct");

        assert_eq!(scripted.calls(), 4);
        assert_eq!(second.turns().len(), 2);
    }

    #[test]
    fn discard_last_exchange_drops_one_pair() {
        let scripted = ScriptedBackend::new();
        scripted.reply_text("a").reply_text("b");
        let mut session = create_session(scripted, "m").expect("session");
        session.send("1", &SendOptions::default()).expect("send");
        session.send("2", &SendOptions::default()).expect("send");

        session.discard_last_exchange();

        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.turns()[1].text, "a");
    }
}
