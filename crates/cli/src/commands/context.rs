//! `dawnagent context`: print the assembled session prompt.

use dawnagent_agent::SessionSettings;
use dawnagent_config::AppConfig;

use super::personas::resolve_persona;

pub async fn run(
    persona: Option<String>,
    weather: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let choice = resolve_persona(&config.personas_dir, persona.as_deref());
    let mut settings = SessionSettings::from_config(&config);
    if let Some(path) = choice.path {
        settings = settings.with_persona(path);
    }
    if let Some(weather) = weather {
        settings = settings.with_weather(weather);
    }

    let context = settings.assembler().assemble();

    println!("{}", "=".repeat(60));
    println!("  DawnAgent: assembled context (persona: {})", choice.name);
    println!("{}", "=".repeat(60));
    println!();
    println!("{}", context.prompt_text);
    println!();
    println!("{}", "=".repeat(60));
    println!("  Total characters: {}", context.prompt_text.chars().count());
    println!("  Estimated tokens: ~{}", context.size_estimate);
    if context.size_estimate > settings.context_warn_tokens {
        println!(
            "  Over the {}-token advisory threshold; consider trimming templates.",
            settings.context_warn_tokens
        );
    }

    Ok(())
}
