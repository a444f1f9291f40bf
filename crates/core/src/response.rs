//! Parsed model output.
//!
//! Every turn yields one [`AgentResponse`], split into its three consumers:
//! speech synthesis, transcript display, and memory persistence.

use serde::{Deserialize, Serialize};

/// A single conversation turn from the agent.
///
/// `display_text` is always derived from `speech_text` by tag stripping;
/// it is never produced independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Model output with `[emotion]` tags kept and the memory block removed.
    pub speech_text: String,

    /// Plain transcript text: tags stripped, lines joined with single spaces.
    pub display_text: String,

    /// The delimited memory update block, markers included, if one was emitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_update: Option<String>,
}

impl AgentResponse {
    /// Whether stripping changed anything a listener would hear.
    pub fn has_tags(&self) -> bool {
        self.speech_text != self.display_text
    }
}

/// One line of dialogue with the vocal affect it should be rendered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionLine {
    /// e.g. "warm", "curious", "whispering"
    pub tag: String,
    /// The spoken content
    pub text: String,
}

impl EmotionLine {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
        }
    }
}
