//! The session lifecycle.
//!
//! ```text
//! Idle --start()--> Active --send()/stream()--> Active --end()--> Ended
//! ```
//!
//! All state lives behind one async mutex that every operation holds for
//! its whole duration, so turns on a session never overlap and a state
//! transition never races a turn. `Ended` is terminal.

use std::path::PathBuf;
use std::sync::Arc;

use dawnagent_config::AppConfig;
use dawnagent_core::error::{Error, Result};
use dawnagent_core::provider::Provider;
use dawnagent_core::response::AgentResponse;
use dawnagent_memory::{DEFAULT_BUDGET_TOKENS, MemoryBudget, MemoryStore};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::context::{ContextAssembler, ContextOptions, Template};
use crate::handle::{GenerationSettings, ModelHandle};
use crate::parser;

/// Prompt size above which `start()` logs an advisory.
pub const DEFAULT_CONTEXT_WARN_TOKENS: usize = 3000;

/// Everything a session needs besides the provider.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub agent_dir: PathBuf,
    pub context: ContextOptions,
    pub generation: GenerationSettings,
    pub context_warn_tokens: usize,
    pub memory_budget_tokens: usize,
    /// Write memory update blocks to the memory document
    pub persist_memory: bool,
}

impl SessionSettings {
    pub fn new(agent_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_dir: agent_dir.into(),
            context: ContextOptions::default(),
            generation: GenerationSettings::default(),
            context_warn_tokens: DEFAULT_CONTEXT_WARN_TOKENS,
            memory_budget_tokens: DEFAULT_BUDGET_TOKENS,
            persist_memory: true,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            agent_dir: config.agent_dir.clone(),
            context: ContextOptions {
                memory_path: config.memory_file.clone(),
                weather: config.weather.clone(),
                ..ContextOptions::default()
            },
            generation: GenerationSettings {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: Some(config.max_tokens),
            },
            context_warn_tokens: config.session.context_warn_tokens,
            memory_budget_tokens: config.session.memory_budget_tokens,
            persist_memory: config.session.persist_memory,
        }
    }

    pub fn with_persona(mut self, path: impl Into<PathBuf>) -> Self {
        self.context.persona_path = Some(path.into());
        self
    }

    pub fn with_weather(mut self, weather: impl Into<String>) -> Self {
        self.context.weather = Some(weather.into());
        self
    }

    pub fn with_memory_override(mut self, memory: impl Into<String>) -> Self {
        self.context.memory_override = Some(memory.into());
        self
    }

    pub fn with_persist_memory(mut self, enabled: bool) -> Self {
        self.persist_memory = enabled;
        self
    }

    /// The memory document sessions read and update.
    pub fn memory_path(&self) -> PathBuf {
        self.context
            .memory_path
            .clone()
            .unwrap_or_else(|| self.agent_dir.join(Template::Memory.file_name()))
    }

    pub fn assembler(&self) -> ContextAssembler {
        ContextAssembler::new(&self.agent_dir, self.context.clone())
    }
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    Ended,
}

enum SessionState {
    Idle,
    Active(ModelHandle),
    Ended,
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Active(_) => SessionPhase::Active,
            SessionState::Ended => SessionPhase::Ended,
        }
    }
}

/// Drives one conversation from start to end.
pub struct SessionController {
    provider: Arc<dyn Provider>,
    settings: SessionSettings,
    memory: MemoryStore,
    state: Mutex<SessionState>,
}

impl SessionController {
    pub fn new(provider: Arc<dyn Provider>, settings: SessionSettings) -> Self {
        let memory = MemoryStore::new(settings.memory_path());
        Self {
            provider,
            settings,
            memory,
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn memory_store(&self) -> &MemoryStore {
        &self.memory
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase()
    }

    /// Check availability, assemble the prompt and open a model session.
    ///
    /// Returns the prompt's size estimate.
    pub async fn start(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        if !matches!(*state, SessionState::Idle) {
            return Err(Error::SessionAlreadyStarted);
        }

        match self.provider.health_check().await {
            Ok(true) => {}
            Ok(false) => {
                warn!(provider = self.provider.name(), "Generation model unavailable");
                return Err(Error::ModelUnavailable);
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Availability check failed");
                return Err(Error::ModelUnavailable);
            }
        }

        let context = self.settings.assembler().assemble();
        let size_estimate = context.size_estimate;
        if size_estimate > self.settings.context_warn_tokens {
            warn!(
                tokens = size_estimate,
                threshold = self.settings.context_warn_tokens,
                "Session context is large; consider trimming templates"
            );
        }

        let handle = ModelHandle::new(
            self.provider.clone(),
            self.settings.generation.clone(),
            context.prompt_text,
        );
        *state = SessionState::Active(handle);
        info!(provider = self.provider.name(), tokens = size_estimate, "Session started");
        Ok(size_estimate)
    }

    /// One-shot turn.
    pub async fn send(&self, message: &str) -> Result<AgentResponse> {
        let mut state = self.state.lock().await;
        let handle = active(&mut state)?;

        let raw = handle.respond(message).await?;
        Ok(self.finish_turn(&raw))
    }

    /// Streamed turn: `on_partial` sees each raw fragment as it arrives.
    ///
    /// Parsing and memory persistence happen only after the last fragment.
    pub async fn stream<F>(&self, message: &str, on_partial: F) -> Result<AgentResponse>
    where
        F: FnMut(&str) + Send,
    {
        let mut state = self.state.lock().await;
        let handle = active(&mut state)?;

        let raw = handle.respond_streaming(message, on_partial).await?;
        Ok(self.finish_turn(&raw))
    }

    /// Close the session and report on the memory document's size.
    pub async fn end(&self) -> Result<MemoryBudget> {
        let mut state = self.state.lock().await;
        if !matches!(*state, SessionState::Active(_)) {
            return Err(Error::SessionNotStarted);
        }
        *state = SessionState::Ended;
        info!("Session ended");

        let budget = self.memory.check_token_budget(self.settings.memory_budget_tokens);
        if budget.over_budget {
            warn!(
                tokens = budget.token_count,
                threshold = budget.threshold,
                "{}",
                budget.recommendation
            );
        } else {
            info!(tokens = budget.token_count, "{}", budget.recommendation);
        }
        Ok(budget)
    }

    fn finish_turn(&self, raw: &str) -> AgentResponse {
        let response = parser::parse(raw);
        debug!(
            chars = response.speech_text.len(),
            memory_update = response.memory_update.is_some(),
            "Turn complete"
        );
        if let Some(block) = &response.memory_update {
            self.persist(block);
        }
        response
    }

    /// Best effort: a failed write is logged, never returned.
    fn persist(&self, block: &str) {
        if !self.settings.persist_memory {
            debug!("Memory writes disabled, update not saved");
            return;
        }
        match self.memory.write_update(block) {
            Ok(()) => info!(path = %self.memory.path().display(), "Memory updated"),
            Err(e) => warn!(error = %e, "Memory update not saved"),
        }
    }
}

fn active(state: &mut SessionState) -> Result<&mut ModelHandle> {
    match state {
        SessionState::Active(handle) => Ok(handle),
        _ => Err(Error::SessionNotStarted),
    }
}
