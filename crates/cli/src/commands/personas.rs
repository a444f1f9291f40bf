//! `dawnagent personas` and persona-name resolution.

use std::path::{Path, PathBuf};

use dawnagent_agent::context::Template;
use dawnagent_config::AppConfig;
use tracing::warn;

/// Name used for the agent directory's own `persona.md`.
pub const DEFAULT_PERSONA: &str = "default";

/// Scaffolding file in the personas directory, never a real persona.
const TEMPLATE_STEM: &str = "template";

/// The persona a session will run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaChoice {
    pub name: String,
    /// `None` means the agent directory's default persona.
    pub path: Option<PathBuf>,
}

impl PersonaChoice {
    fn default_persona() -> Self {
        Self {
            name: DEFAULT_PERSONA.into(),
            path: None,
        }
    }
}

/// Resolve a `--persona` argument.
///
/// An existing file path is used as given; otherwise the name is looked up
/// as `<personas_dir>/<name>.md`. Anything unresolvable falls back to the
/// default persona with a warning.
pub fn resolve_persona(personas_dir: &Path, arg: Option<&str>) -> PersonaChoice {
    let arg = match arg.map(str::trim) {
        None | Some("") => return PersonaChoice::default_persona(),
        Some(a) if a.eq_ignore_ascii_case(DEFAULT_PERSONA) => {
            return PersonaChoice::default_persona();
        }
        Some(a) => a,
    };

    let as_path = Path::new(arg);
    if as_path.is_file() {
        return PersonaChoice {
            name: stem(as_path),
            path: Some(as_path.to_path_buf()),
        };
    }

    let named = personas_dir.join(format!("{arg}.md"));
    if named.is_file() {
        return PersonaChoice {
            name: arg.to_string(),
            path: Some(named),
        };
    }

    warn!(persona = arg, dir = %personas_dir.display(), "Persona not found, using default");
    PersonaChoice::default_persona()
}

/// Persona documents in `personas_dir`, sorted by name.
pub fn list_personas(personas_dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(personas_dir) else {
        return Vec::new();
    };

    let mut personas: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .map(|p| (stem(&p), p))
        .filter(|(name, _)| name != TEMPLATE_STEM)
        .collect();
    personas.sort();
    personas
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!();
    println!("  Available personas:");
    println!(
        "    {:<16} {}",
        DEFAULT_PERSONA,
        config.agent_dir.join(Template::Persona.file_name()).display()
    );
    for (name, path) in list_personas(&config.personas_dir) {
        println!("    {:<16} {}", name, path.display());
    }
    println!();

    Ok(())
}
