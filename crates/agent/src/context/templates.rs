//! Template fragments: the six named documents of an agent directory.
//!
//! Loading never fails. A file that is missing or unreadable is replaced by
//! a visible placeholder naming it, so the model (and anyone reading the
//! assembled prompt) can see what was skipped.

use std::path::{Path, PathBuf};
use tracing::debug;

/// One of the six fixed fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    Guardrails,
    Agent,
    Persona,
    Voice,
    Memory,
    Topics,
}

impl Template {
    /// All fragments, in prompt order.
    pub const ALL: [Template; 6] = [
        Template::Guardrails,
        Template::Agent,
        Template::Persona,
        Template::Voice,
        Template::Memory,
        Template::Topics,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Template::Guardrails => "guardrails.md",
            Template::Agent => "agent.md",
            Template::Persona => "persona.md",
            Template::Voice => "voice.md",
            Template::Memory => "memory.md",
            Template::Topics => "topics.md",
        }
    }
}

/// Text substituted for a fragment that could not be read.
pub fn placeholder(file_name: &str) -> String {
    format!("<!-- {file_name} not found, skipping -->")
}

/// Read a fragment from `path`: trimmed content, or the placeholder.
pub fn read_fragment(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content.trim().to_string(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Template fragment unavailable");
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            placeholder(&name)
        }
    }
}

/// The six fragments of one assembly. Reloaded fresh every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub guardrails: String,
    pub agent: String,
    pub persona: String,
    pub voice: String,
    pub memory: String,
    pub topics: String,
}

/// Loads fragments from an agent directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Default location of `template` inside the directory.
    pub fn path(&self, template: Template) -> PathBuf {
        self.dir.join(template.file_name())
    }

    pub fn load(&self, template: Template) -> String {
        read_fragment(&self.path(template))
    }

    /// Load all six fragments.
    ///
    /// `persona` and `memory` replace the default file locations for those
    /// two fragments when given.
    pub fn load_set(&self, persona: Option<&Path>, memory: Option<&Path>) -> TemplateSet {
        let load_or = |template: Template, path: Option<&Path>| match path {
            Some(path) => read_fragment(path),
            None => self.load(template),
        };

        TemplateSet {
            guardrails: self.load(Template::Guardrails),
            agent: self.load(Template::Agent),
            persona: load_or(Template::Persona, persona),
            voice: self.load(Template::Voice),
            memory: load_or(Template::Memory, memory),
            topics: self.load(Template::Topics),
        }
    }
}
