//! Core chat session management.
//!
//! This module provides the [`ChatSession`] struct, which owns the
//! conversation log and drives one streaming exchange per submitted message.
//!
//! A submission is pull-based: [`ChatSession::submit_user_message`] returns a
//! [`TurnStream`] yielding the cumulative response buffer after every delta.
//! Whatever happens to the exchange, the buffer is committed to the log as the
//! assistant turn exactly once: when the stream ends, when it fails, or when the
//! `TurnStream` is dropped early.
//!
//! The `TurnStream` mutably borrows the session, so a second submission cannot
//! start while one is in flight:
//!
//! ```compile_fail
//! # use lavo::chat::ChatSession;
//! # async fn overlap(session: &mut ChatSession) {
//! let first = session.submit_user_message("one").await;
//! let second = session.submit_user_message("two").await;
//! drop(first);
//! # }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Instant;

use futures::stream::{FusedStream, Stream, StreamExt};

use crate::chat::config::{API_KEY_ENV, SessionConfig, validate_temperature};
use crate::client::OpenAi;
use crate::conversation::ConversationLog;
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_ABANDONED_TURNS, SESSION_CONFIG_ERRORS, SESSION_DELTAS, SESSION_EMPTY_INPUTS,
    SESSION_STREAM_ERRORS, SESSION_SUBMISSIONS, SESSION_TURN_DURATION,
};
use crate::provider::{CompletionProvider, DeltaStream};
use crate::render::Renderer;
use crate::types::{ChatCompletionRequest, Model};

/// A chat session that manages conversation state and provider interactions.
pub struct ChatSession<P: CompletionProvider = OpenAi> {
    provider: P,
    config: SessionConfig,
    log: ConversationLog,
    counters: TurnCounters,
}

#[derive(Debug, Clone, Copy, Default)]
struct TurnCounters {
    submissions: u64,
    failed_turns: u64,
    last_response_chars: usize,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: Model,
    /// The number of turns in the log, system turn included.
    pub message_count: usize,
    /// The sampling temperature.
    pub temperature: f32,
    /// The active system prompt, if any.
    pub system_prompt: Option<String>,
    /// Submissions that reached the provider.
    pub submissions: u64,
    /// Turns committed after a stream error.
    pub failed_turns: u64,
    /// Characters in the most recent assistant turn.
    pub last_response_chars: usize,
}

/// How a streaming exchange ended.
///
/// Both variants correspond to an assistant turn already committed to the log.
#[derive(Clone, Debug)]
pub enum TurnOutcome {
    /// The provider finished the response.
    Completed(String),
    /// The exchange broke; `partial` is what arrived before `cause`.
    Failed {
        /// Text accumulated before the failure.
        partial: String,
        /// The underlying stream error.
        cause: Error,
    },
}

impl TurnOutcome {
    /// The text committed as the assistant turn.
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Completed(text) => text,
            TurnOutcome::Failed { partial, .. } => partial,
        }
    }

    /// Returns true if the provider finished the response.
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed(_))
    }

    /// Converts into the full text, or the stream error.
    pub fn into_result(self) -> Result<String> {
        match self {
            TurnOutcome::Completed(text) => Ok(text),
            TurnOutcome::Failed { cause, .. } => Err(cause),
        }
    }
}

impl ChatSession<OpenAi> {
    /// Creates a session talking to the OpenAI-compatible endpoint in `config`.
    ///
    /// A missing credential is not an error here; it surfaces on submission.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let provider = OpenAi::with_options(Some(&config.base_url), None)?;
        Ok(Self::with_provider(provider, config))
    }
}

impl<P: CompletionProvider> ChatSession<P> {
    /// Creates a session over any completion provider.
    ///
    /// The log starts with a single system turn holding `config.system_prompt`.
    pub fn with_provider(provider: P, config: SessionConfig) -> Self {
        let log = ConversationLog::new(config.system_prompt.clone());
        Self {
            provider,
            config,
            log,
            counters: TurnCounters::default(),
        }
    }

    /// Returns the completion provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Replaces the system turn with `prompt`.
    ///
    /// Takes effect for the next submission. Also records `prompt` as the
    /// configured system prompt.
    pub fn apply_system_prompt(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        self.config.system_prompt.clone_from(&prompt);
        self.log.apply_system_prompt(prompt);
    }

    /// Re-applies the configured system prompt to the log.
    ///
    /// Edits made through [`config_mut`](Self::config_mut) stay out of the
    /// conversation until this is called.
    pub fn reapply_system_prompt(&mut self) {
        self.log.apply_system_prompt(self.config.system_prompt.clone());
    }

    /// Submits a user message and opens the response stream.
    ///
    /// Returns `Ok(None)` without touching the log or the provider when `text`
    /// is empty or whitespace. Fails with [`Error::Config`] before any mutation
    /// when no credential is configured. Otherwise the user turn is appended
    /// and a [`TurnStream`] over the response is returned; a failure to open
    /// the stream is reported through that `TurnStream` like any other stream
    /// error.
    pub async fn submit_user_message(&mut self, text: &str) -> Result<Option<TurnStream<'_>>> {
        if text.trim().is_empty() {
            SESSION_EMPTY_INPUTS.click();
            return Ok(None);
        }
        let api_key = match self.config.api_key.as_ref().filter(|key| !key.is_empty()) {
            Some(key) => key.clone(),
            None => {
                SESSION_CONFIG_ERRORS.click();
                return Err(Error::config(format!("{API_KEY_ENV} is not set")));
            }
        };

        SESSION_SUBMISSIONS.click();
        self.counters.submissions += 1;
        self.log.push_user(text);
        let request = ChatCompletionRequest::new(
            self.config.model.clone(),
            self.log.turns().to_vec(),
            self.config.temperature,
        );

        let mut turn = TurnStream::new(&mut self.log, &mut self.counters);
        match self.provider.stream_chat(&api_key, request).await {
            Ok(deltas) => turn.deltas = Some(deltas),
            Err(err) => turn.failure = Some(into_stream_error(err)),
        }
        Ok(Some(turn))
    }

    /// Sends a user message and renders the response as it streams.
    ///
    /// This method:
    /// 1. Submits the message
    /// 2. Hands every cumulative buffer to the renderer
    /// 3. Finishes the response once the turn is committed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no credential is configured and
    /// [`Error::Streaming`] when the exchange broke; in the latter case the
    /// partial response is already in the log.
    pub async fn send_streaming(&mut self, text: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let Some(mut turn) = self.submit_user_message(text).await? else {
            return Ok(());
        };
        while let Some(buffer) = turn.next().await {
            renderer.print_partial(&buffer);
        }
        let outcome = turn.finish().await;
        renderer.finish_response();
        outcome.into_result().map(|_| ())
    }

    /// Returns the conversation log.
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Returns the number of turns in the conversation, system turn included.
    pub fn message_count(&self) -> usize {
        self.log.len()
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the session configuration for mutation.
    ///
    /// Changing the system prompt here does not alter the log; call
    /// [`reapply_system_prompt`](Self::reapply_system_prompt) for that.
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// Changes the model used for responses.
    pub fn set_model(&mut self, model: Model) {
        self.config.model = model;
    }

    /// Returns the current model.
    pub fn model(&self) -> &Model {
        &self.config.model
    }

    /// Sets the sampling temperature.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        self.config.temperature = validate_temperature(temperature)?;
        Ok(())
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.config.model.clone(),
            message_count: self.message_count(),
            temperature: self.config.temperature,
            system_prompt: self.log.system_prompt().map(str::to_string),
            submissions: self.counters.submissions,
            failed_turns: self.counters.failed_turns,
            last_response_chars: self.counters.last_response_chars,
        }
    }
}

/// The response to one submitted user message.
///
/// Yields the cumulative buffer after every delta: the n-th item is the
/// concatenation of deltas 1 through n. The stream ends when the provider
/// finishes or fails; [`finish`](Self::finish) reports which.
pub struct TurnStream<'a> {
    log: &'a mut ConversationLog,
    counters: &'a mut TurnCounters,
    deltas: Option<DeltaStream>,
    buffer: String,
    failure: Option<Error>,
    committed: bool,
    started: Instant,
}

impl<'a> TurnStream<'a> {
    fn new(log: &'a mut ConversationLog, counters: &'a mut TurnCounters) -> Self {
        Self {
            log,
            counters,
            deltas: None,
            buffer: String::new(),
            failure: None,
            committed: false,
            started: Instant::now(),
        }
    }

    /// The text accumulated so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// The stream error, once one has occurred.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Consumes the rest of the response and reports how the exchange ended.
    pub async fn finish(mut self) -> TurnOutcome {
        while self.next().await.is_some() {}
        let partial = std::mem::take(&mut self.buffer);
        match self.failure.take() {
            None => TurnOutcome::Completed(partial),
            Some(cause) => TurnOutcome::Failed { partial, cause },
        }
    }

    fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        self.log.push_assistant(self.buffer.clone());
        self.counters.last_response_chars = self.buffer.chars().count();
        if self.failure.is_some() {
            self.counters.failed_turns += 1;
            SESSION_STREAM_ERRORS.click();
        }
        SESSION_TURN_DURATION.add(self.started.elapsed().as_secs_f64());
    }
}

impl Stream for TurnStream<'_> {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        if let Some(deltas) = this.deltas.as_mut() {
            match ready!(deltas.as_mut().poll_next(cx)) {
                Some(Ok(delta)) => {
                    SESSION_DELTAS.click();
                    this.buffer.push_str(&delta);
                    return Poll::Ready(Some(this.buffer.clone()));
                }
                Some(Err(err)) => this.failure = Some(into_stream_error(err)),
                None => {}
            }
            this.deltas = None;
        }
        this.commit();
        Poll::Ready(None)
    }
}

impl FusedStream for TurnStream<'_> {
    fn is_terminated(&self) -> bool {
        self.committed
    }
}

impl Drop for TurnStream<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if self.deltas.take().is_some() {
                SESSION_ABANDONED_TURNS.click();
            }
            self.commit();
        }
    }
}

fn into_stream_error(err: Error) -> Error {
    if err.is_streaming() {
        err
    } else {
        Error::streaming(format!("stream failed: {err}"), Some(Box::new(err)))
    }
}
