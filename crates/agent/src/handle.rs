//! A live generation session.
//!
//! The handle owns the session-lifetime instructions and the running
//! transcript. Every request sends the instructions as the system message,
//! then the transcript, then the new user message. A turn is recorded only
//! once its reply is complete; a failed turn leaves the transcript as it was.

use std::sync::Arc;

use dawnagent_core::error::ProviderError;
use dawnagent_core::message::Message;
use dawnagent_core::provider::{Provider, ProviderRequest};
use tracing::{debug, trace};

/// Per-request generation parameters.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".into(),
            temperature: 0.7,
            max_tokens: Some(512),
        }
    }
}

pub struct ModelHandle {
    provider: Arc<dyn Provider>,
    settings: GenerationSettings,
    instructions: Message,
    transcript: Vec<Message>,
}

impl ModelHandle {
    pub fn new(
        provider: Arc<dyn Provider>,
        settings: GenerationSettings,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            settings,
            instructions: Message::system(instructions),
            transcript: Vec::new(),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions.content
    }

    /// Completed turns, oldest first.
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    fn request(&self, message: &str, stream: bool) -> ProviderRequest {
        let mut messages = Vec::with_capacity(self.transcript.len() + 2);
        messages.push(self.instructions.clone());
        messages.extend(self.transcript.iter().cloned());
        messages.push(Message::user(message));

        ProviderRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream,
        }
    }

    fn record_turn(&mut self, message: &str, reply: &str) {
        self.transcript.push(Message::user(message));
        self.transcript.push(Message::assistant(reply));
    }

    /// One-shot: the full reply text, atomically.
    pub async fn respond(&mut self, message: &str) -> Result<String, ProviderError> {
        let request = self.request(message, false);
        debug!(
            provider = self.provider.name(),
            turns = self.transcript.len() / 2,
            "Requesting reply"
        );

        let response = self.provider.complete(request).await?;
        let reply = response.message.content;
        self.record_turn(message, &reply);
        Ok(reply)
    }

    /// Incremental: hand each fragment to `on_fragment` in arrival order,
    /// then return the concatenated reply.
    ///
    /// The next fragment is not awaited until the callback for the current
    /// one has returned.
    pub async fn respond_streaming<F>(
        &mut self,
        message: &str,
        mut on_fragment: F,
    ) -> Result<String, ProviderError>
    where
        F: FnMut(&str) + Send,
    {
        let request = self.request(message, true);
        debug!(
            provider = self.provider.name(),
            turns = self.transcript.len() / 2,
            "Requesting streamed reply"
        );

        let mut rx = self.provider.stream(request).await?;
        let mut reply = String::new();
        let mut fragments = 0usize;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(content) = chunk.content.as_deref().filter(|c| !c.is_empty()) {
                on_fragment(content);
                reply.push_str(content);
                fragments += 1;
            }
            if chunk.done {
                break;
            }
        }

        trace!(fragments, chars = reply.len(), "Stream complete");
        self.record_turn(message, &reply);
        Ok(reply)
    }
}
