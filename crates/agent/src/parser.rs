//! Model output parsing.
//!
//! Raw model text carries two kinds of markup on top of what should be
//! spoken:
//!
//! - a memory update block, delimited by [`MEMORY_START_MARKER`] and
//!   [`MEMORY_END_MARKER`], holding facts to persist between sessions
//! - emotion tags such as `[warm]` prefixing lines, steering speech synthesis
//!
//! ```text
//! [warm] Morning. Slept any better?
//! [curious] What's first on the list today?
//! ---MEMORY UPDATE---
//! - Prefers tea before coffee
//! ---END UPDATE---
//! ```
//!
//! [`parse`] splits this into speech text (tags kept), display text (tags
//! removed, one line) and the optional memory block. Everything here is pure.

use dawnagent_core::response::{AgentResponse, EmotionLine};
use std::ops::Range;

pub const MEMORY_START_MARKER: &str = "---MEMORY UPDATE---";
pub const MEMORY_END_MARKER: &str = "---END UPDATE---";

/// Parse one complete model reply.
pub fn parse(raw: &str) -> AgentResponse {
    let (speech_text, memory_update) = match memory_block_range(raw) {
        Some(block) => {
            let memory = raw[block.clone()].trim().to_string();
            let speech = format!("{}{}", &raw[..block.start], &raw[block.end..]);
            (speech.trim().to_string(), Some(memory))
        }
        None => (raw.trim().to_string(), None),
    };

    let display_text = display_text(&speech_text);
    AgentResponse {
        speech_text,
        display_text,
        memory_update,
    }
}

/// Byte range of the first complete memory block, markers included.
///
/// The end marker is only searched for after the start marker; a start
/// marker without one is not a block.
fn memory_block_range(raw: &str) -> Option<Range<usize>> {
    let start = raw.find(MEMORY_START_MARKER)?;
    let body = start + MEMORY_START_MARKER.len();
    let end = body + raw[body..].find(MEMORY_END_MARKER)? + MEMORY_END_MARKER.len();
    Some(start..end)
}

/// The memory block of `raw`, if it has a complete one.
pub fn extract_memory_update(raw: &str) -> Option<String> {
    memory_block_range(raw).map(|r| raw[r].trim().to_string())
}

/// Remove emotion tags, scanning left to right.
///
/// A tag is a bracket pair whose content is only letters and underscores
/// (empty included). Stripping stops for good at the first bracket that is
/// not a tag, or that has no closing `]`: the rest is kept verbatim.
pub fn strip_emotion_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find(']') else {
            break;
        };
        let inner = &after_open[..close];
        if !inner.chars().all(|c| c.is_alphabetic() || c == '_') {
            break;
        }
        out.push_str(&rest[..open]);
        rest = &after_open[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Tag-free, single-line rendering of speech text.
pub fn display_text(speech_text: &str) -> String {
    let stripped = strip_emotion_tags(speech_text);
    stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Split speech text into tagged lines.
///
/// Only lines starting with `[` (after trimming) and containing a `]`
/// count. The tag is whatever sits between the first `[` and the first `]`;
/// lines with no text after the tag are dropped.
pub fn parse_emotion_lines(speech_text: &str) -> Vec<EmotionLine> {
    speech_text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let tagged = line.strip_prefix('[')?;
            let close = tagged.find(']')?;
            let text = tagged[close + 1..].trim();
            (!text.is_empty()).then(|| EmotionLine::new(&tagged[..close], text))
        })
        .collect()
}
