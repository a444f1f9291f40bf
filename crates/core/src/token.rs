//! Token estimation.
//!
//! Uses a character-based heuristic: ~4 characters per token. This is the
//! contract for every size figure in the system (prompt estimate, memory
//! budget); it is not tokenizer-accurate.

/// Estimate the token count for a string.
///
/// Heuristic: character count divided by 4, rounded down.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
