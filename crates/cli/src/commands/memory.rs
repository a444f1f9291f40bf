//! `dawnagent memory`: inspect the memory document.

use dawnagent_agent::SessionSettings;
use dawnagent_config::AppConfig;
use dawnagent_memory::MemoryStore;

fn store() -> Result<(MemoryStore, usize), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let settings = SessionSettings::from_config(&config);
    Ok((MemoryStore::new(settings.memory_path()), settings.memory_budget_tokens))
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _) = store()?;
    println!("--- {} ---", store.path().display());
    match store.read() {
        Ok(content) => println!("{}", content.trim_end()),
        Err(e) => println!("(empty: {e})"),
    }
    println!("---");
    Ok(())
}

pub async fn budget() -> Result<(), Box<dyn std::error::Error>> {
    let (store, threshold) = store()?;
    let budget = store.check_token_budget(threshold);

    println!("  Memory:     {}", store.path().display());
    println!("  Tokens:     ~{} (budget: {})", budget.token_count, budget.threshold);
    println!("  Status:     {}", if budget.over_budget { "over budget" } else { "ok" });
    println!("  {}", budget.recommendation);
    Ok(())
}
