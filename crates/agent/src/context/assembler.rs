//! Session prompt assembly.
//!
//! Combines the six template fragments with a session metadata block into
//! one ordered prompt:
//!
//! | # | Section |
//! |---|---------|
//! | 1 | guardrails |
//! | 2 | agent |
//! | 3 | persona (override file, else default) |
//! | 4 | voice |
//! | 5 | session metadata (date, weekday, time, time bracket, weather) |
//! | 6 | `# User Memory` + memory (override text, else file) |
//! | 7 | `# Topic Bank (optional reference)` + topics |
//!
//! Sections are joined with [`SECTION_DELIMITER`]. Assembly is deterministic
//! for a given timestamp and set of files; missing files degrade to
//! placeholders.

use crate::context::templates::{Template, TemplateSet, TemplateStore};
use chrono::{Local, NaiveDateTime, Timelike};
use dawnagent_core::token::estimate_tokens;
use std::path::PathBuf;

/// Separator between prompt sections.
pub const SECTION_DELIMITER: &str = "\n\n---\n\n";

/// Weather value used when none is supplied.
pub const DEFAULT_WEATHER: &str = "unavailable";

/// Optional inputs that vary per session.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Persona document replacing `persona.md`
    pub persona_path: Option<PathBuf>,
    /// Memory document replacing `memory.md`
    pub memory_path: Option<PathBuf>,
    /// Literal memory text; wins over any memory file
    pub memory_override: Option<String>,
    pub weather: Option<String>,
}

/// An assembled prompt and its size estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub prompt_text: String,
    /// Estimated tokens (characters / 4)
    pub size_estimate: usize,
}

impl SessionContext {
    fn new(prompt_text: String) -> Self {
        let size_estimate = estimate_tokens(&prompt_text);
        Self {
            prompt_text,
            size_estimate,
        }
    }
}

/// Builds the session prompt from an agent directory.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    templates: TemplateStore,
    options: ContextOptions,
}

impl ContextAssembler {
    pub fn new(agent_dir: impl Into<PathBuf>, options: ContextOptions) -> Self {
        Self {
            templates: TemplateStore::new(agent_dir),
            options,
        }
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Assemble using the current local time.
    pub fn assemble(&self) -> SessionContext {
        self.assemble_at(Local::now().naive_local())
    }

    /// Assemble as of `now`.
    pub fn assemble_at(&self, now: NaiveDateTime) -> SessionContext {
        let mut set = self.templates.load_set(
            self.options.persona_path.as_deref(),
            self.options.memory_path.as_deref(),
        );
        if let Some(memory) = &self.options.memory_override {
            set.memory = memory.clone();
        }

        let block = session_block(now, self.options.weather.as_deref());
        SessionContext::new(join_sections(&set, &block))
    }

    /// Path the persona fragment is read from.
    pub fn persona_source(&self) -> PathBuf {
        self.options
            .persona_path
            .clone()
            .unwrap_or_else(|| self.templates.path(Template::Persona))
    }
}

fn join_sections(set: &TemplateSet, session_block: &str) -> String {
    let memory = format!("# User Memory\n{}", set.memory);
    let topics = format!("# Topic Bank (optional reference)\n{}", set.topics);

    [
        set.guardrails.as_str(),
        set.agent.as_str(),
        set.persona.as_str(),
        set.voice.as_str(),
        session_block,
        memory.as_str(),
        topics.as_str(),
    ]
    .join(SECTION_DELIMITER)
}

/// Coarse part of the morning for `hour` (0-23).
pub fn time_bracket(hour: u32) -> &'static str {
    match hour {
        0..=6 => "early-morning",
        7..=9 => "morning",
        _ => "late-morning",
    }
}

/// The session metadata section.
pub fn session_block(now: NaiveDateTime, weather: Option<&str>) -> String {
    format!(
        "# Session Context\n\
         date:         {}\n\
         day_of_week:  {}\n\
         time:         {}\n\
         time_bracket: {}\n\
         weather:      {}",
        now.format("%Y-%m-%d"),
        now.format("%A"),
        now.format("%H:%M"),
        time_bracket(now.hour()),
        weather.unwrap_or(DEFAULT_WEATHER),
    )
}
