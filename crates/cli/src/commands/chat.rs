//! `dawnagent chat`: the interactive morning conversation.

use std::io::Write;

use clap::Args;
use dawnagent_agent::{SessionController, SessionSettings, parse_emotion_lines};
use dawnagent_config::AppConfig;
use dawnagent_core::response::AgentResponse;

use super::personas::{PersonaChoice, resolve_persona};
use crate::input::{is_exit_word, stdin_lines};

/// Sent in place of a user message to get the agent's opening line.
pub const OPENING_INSTRUCTION: &str =
    "[Session start: generate your opening message now. Output in emotion-annotated format only.]";

/// Appended to the user's farewell so the closing reply carries a memory update.
pub const CLOSING_INSTRUCTION: &str = "[Session ending. Output your closing line in \
     emotion-annotated format, then immediately append a ---MEMORY UPDATE--- block.]";

/// Local preset used by `--local` when no model is named.
const DEFAULT_LOCAL_MODEL: &str = "tinyllama";

#[derive(Args, Debug, Default)]
pub struct ChatArgs {
    /// Persona name (from the personas directory) or path to a persona file
    #[arg(short, long)]
    pub persona: Option<String>,

    /// Weather line for the session context
    #[arg(short, long)]
    pub weather: Option<String>,

    /// Parse memory updates but never write them
    #[arg(long)]
    pub no_memory_write: bool,

    /// Override the configured model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Run the model on this machine instead of a remote endpoint
    #[arg(long)]
    pub local: bool,
}

/// Combined farewell message for the closing turn.
pub fn closing_message(farewell: &str) -> String {
    format!("{farewell}\n\n{CLOSING_INSTRUCTION}")
}

fn apply_args(config: &mut AppConfig, args: &ChatArgs) {
    if args.local {
        config.provider = "local".into();
        config.model = DEFAULT_LOCAL_MODEL.into();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(weather) = &args.weather {
        config.weather = Some(weather.clone());
    }
}

fn settings_for(config: &AppConfig, persona: &PersonaChoice, args: &ChatArgs) -> SessionSettings {
    let mut settings = SessionSettings::from_config(config);
    if let Some(path) = &persona.path {
        settings = settings.with_persona(path);
    }
    if args.no_memory_write {
        settings = settings.with_persist_memory(false);
    }
    settings
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    apply_args(&mut config, &args);

    let persona = resolve_persona(&config.personas_dir, args.persona.as_deref());
    let settings = settings_for(&config, &persona, &args);
    let provider = dawnagent_providers::build_from_config(&config)?;
    let session = SessionController::new(provider, settings);

    let context_tokens = match session.start().await {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!();
            eprintln!("  Failed to start session: {e}");
            if config.provider != "local" && config.api_key.is_none() {
                eprintln!("  No API key configured. Set DAWNAGENT_API_KEY or DEEPSEEK_API_KEY,");
                eprintln!(
                    "  or add api_key to {}",
                    AppConfig::config_dir().join("config.toml").display()
                );
            }
            eprintln!();
            return Err(e.into());
        }
    };

    println!();
    println!("{}", "=".repeat(60));
    println!("  DawnAgent: morning conversation");
    println!("  Persona:  {}", persona.name);
    println!("  Model:    {} ({})", config.model, config.provider);
    println!("  Context:  ~{context_tokens} tokens");
    println!("{}", "=".repeat(60));
    println!("  Type 'bye' to end  |  /memory  /context  /persona");
    println!();

    agent_turn(&session, OPENING_INSTRUCTION).await;

    let mut lines = stdin_lines();
    loop {
        print!("You > ");
        std::io::stdout().flush()?;

        // End of input ends the conversation like a farewell.
        let line = lines.recv().await.unwrap_or_else(|| "bye".into());

        if line.starts_with('/') {
            slash_command(&session, &line, &persona, context_tokens);
            continue;
        }

        if is_exit_word(&line) {
            println!();
            if let Some(response) = agent_turn(&session, &closing_message(&line)).await {
                report_memory(&session, &response);
            }
            break;
        }

        println!();
        agent_turn(&session, &line).await;
    }

    let budget = session.end().await?;
    println!("  [{}]", budget.recommendation);
    println!("{}", "=".repeat(60));
    println!();

    Ok(())
}

/// Stream one turn to stdout. Errors are printed, not returned.
async fn agent_turn(session: &SessionController, message: &str) -> Option<AgentResponse> {
    print!("Agent > ");
    let _ = std::io::stdout().flush();

    let result = session
        .stream(message, |fragment| {
            print!("{fragment}");
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();
    println!();

    match result {
        Ok(response) => {
            print_turn_details(&response);
            Some(response)
        }
        Err(e) => {
            eprintln!("  [Error] {e}");
            println!();
            None
        }
    }
}

fn print_turn_details(response: &AgentResponse) {
    if response.has_tags() {
        println!("  [clean] {}", response.display_text);
    }
    let tags: Vec<_> = parse_emotion_lines(&response.speech_text)
        .into_iter()
        .map(|line| format!("[{}]", line.tag))
        .collect();
    if !tags.is_empty() {
        println!("  [tags]  {}", tags.join(" "));
    }
    if response.has_tags() || !tags.is_empty() {
        println!();
    }
}

fn report_memory(session: &SessionController, response: &AgentResponse) {
    let Some(block) = &response.memory_update else {
        println!("  [No memory update block found in closing response.]");
        return;
    };

    let store = session.memory_store();
    if !session.settings().persist_memory {
        println!("  [Memory update generated but --no-memory-write is set. Not persisting.]");
        println!();
        println!("{block}");
        println!();
        return;
    }

    let written = store
        .read()
        .map(|doc| doc.contains(block.as_str()))
        .unwrap_or(false);
    if written {
        println!("  [Memory updated: {}]", store.path().display());
    } else {
        println!("  [!] Memory update failed; see the warning above.");
    }
}

fn slash_command(
    session: &SessionController,
    line: &str,
    persona: &PersonaChoice,
    context_tokens: usize,
) {
    let store = session.memory_store();
    println!();
    match line.to_lowercase().as_str() {
        "/memory" => {
            println!("--- {} ---", store.path().display());
            match store.read() {
                Ok(content) => println!("{}", content.trim_end()),
                Err(_) => println!("(empty)"),
            }
            println!("---");
        }
        "/context" => {
            let budget = store.check_token_budget(session.settings().memory_budget_tokens);
            println!("  Context tokens:  ~{context_tokens}");
            println!("  Memory tokens:   ~{}", budget.token_count);
            println!("  {}", budget.recommendation);
        }
        "/persona" => println!("  Active persona: {}", persona.name),
        _ => println!("  Unknown command: {line}"),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_message_carries_farewell_and_instruction() {
        let msg = closing_message("bye");
        assert!(msg.starts_with("bye\n\n[Session ending."));
        assert!(msg.contains("---MEMORY UPDATE---"));
    }

    #[test]
    fn local_flag_switches_provider_and_default_model() {
        let mut config = AppConfig::default();
        apply_args(
            &mut config,
            &ChatArgs {
                local: true,
                ..ChatArgs::default()
            },
        );
        assert_eq!(config.provider, "local");
        assert_eq!(config.model, DEFAULT_LOCAL_MODEL);

        let mut config = AppConfig::default();
        apply_args(
            &mut config,
            &ChatArgs {
                local: true,
                model: Some("llama3.2:1b".into()),
                weather: Some("sunny".into()),
                ..ChatArgs::default()
            },
        );
        assert_eq!(config.model, "llama3.2:1b");
        assert_eq!(config.weather.as_deref(), Some("sunny"));
    }

    #[test]
    fn no_memory_write_disables_persistence() {
        let config = AppConfig::default();
        let persona = resolve_persona(std::path::Path::new("/nonexistent"), None);
        let args = ChatArgs {
            no_memory_write: true,
            ..ChatArgs::default()
        };
        assert!(!settings_for(&config, &persona, &args).persist_memory);
        assert!(settings_for(&config, &persona, &ChatArgs::default()).persist_memory);
    }
}
