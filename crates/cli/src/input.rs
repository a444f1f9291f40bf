//! Line input for the interactive loop.
//!
//! Lines are read on a spawned task and delivered over a channel so the
//! chat loop can await them alongside everything else. The channel closes
//! at end of input.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

/// Words that end the conversation, compared case-insensitively.
pub const EXIT_WORDS: [&str; 4] = ["bye", "exit", "quit", "goodbye"];

pub fn is_exit_word(input: &str) -> bool {
    let input = input.trim();
    EXIT_WORDS.iter().any(|w| w.eq_ignore_ascii_case(input))
}

/// Read lines from stdin.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    spawn_line_reader(tokio::io::stdin())
}

/// Read lines from `reader`, trimmed, blank lines skipped.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(line.to_string()).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Input read failed");
                    break;
                }
            }
        }
    });

    rx
}
