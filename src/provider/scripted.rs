//! Deterministic collaborator that replays canned completions.
//!
//! Used by the test suites and by offline demos; counts how often it was called so
//! callers can assert that cache hits never reach the collaborator.

use crate::error::ApiError;
use crate::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, ModelProviderClient, TokenUsage,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A scripted reply: either completion text or a transport failure
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Failure(String),
}

pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    calls: Arc<AtomicUsize>,
    transcript: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Replies are consumed in order; once exhausted the last one repeats.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        let fallback = replies
            .last()
            .cloned()
            .unwrap_or_else(|| ScriptedReply::Text(String::new()));
        Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
            transcript: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Hold every reply for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| ScriptedReply::Text(t.into())).collect())
    }

    /// Number of completions requested so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared call counter, usable after the provider has been moved into a pipeline
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Messages received, one entry per call
    pub fn transcript(&self) -> Vec<Vec<ChatMessage>> {
        self.transcript.lock().clone()
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcript.lock().push(messages);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            ScriptedReply::Text(content) => Ok(CompletionResponse {
                content,
                model: "scripted".to_string(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            }),
            ScriptedReply::Failure(message) => Err(ApiError::ProviderRequestFailed(message)),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
