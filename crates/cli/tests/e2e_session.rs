//! End-to-end tests for a DawnAgent morning session.
//!
//! These drive the full lifecycle against a temporary agent directory:
//! prompt assembly at start, streamed and one-shot turns, memory
//! persistence from the closing reply, and the budget report at end.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dawnagent_agent::{SessionController, SessionPhase, SessionSettings, parse_emotion_lines};
use dawnagent_core::error::{Error, ProviderError};
use dawnagent_core::message::{Message, Role};
use dawnagent_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted replies in sequence and records every request.
/// Streams reply text in fixed-size character pieces.
struct ScriptedProvider {
    replies: Mutex<Vec<&'static str>>,
    requests: Mutex<Vec<ProviderRequest>>,
    piece: usize,
}

impl ScriptedProvider {
    fn new(replies: Vec<&'static str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
            piece: 5,
        }
    }

    fn next_reply(&self, request: ProviderRequest) -> &'static str {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedProvider exhausted")
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let reply = self.next_reply(request);
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "e2e-model".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let reply = self.next_reply(request);
        let chars: Vec<char> = reply.chars().collect();
        let pieces: Vec<String> = chars.chunks(self.piece).map(|c| c.iter().collect()).collect();

        let (tx, rx) = tokio::sync::mpsc::channel(2);
        tokio::spawn(async move {
            for piece in pieces {
                if tx.send(Ok(StreamChunk::text(piece))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        });
        Ok(rx)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

const OPENING: &str = "[warm] Morning. The kettle's on.\n[curious] How did you sleep?";
const MIDDLE: &str = "[gentle] That's rough.\nWant to ease in slowly today?";
const CLOSING: &str = "[warm] Go easy on yourself today.\n\
    ---MEMORY UPDATE---\n\
    - Slept badly before a big presentation\n\
    ---END UPDATE---";

const MEMORY_DOC: &str = "# User Memory\n\nName: Dana\nPrefers tea.\n\n## SESSION LOG\n\n\
    ### [2026-03-13 07:02]\n---MEMORY UPDATE---\n- Started a new job\n---END UPDATE---\n";

fn agent_dir() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let files = [
        ("guardrails.md", "Never diagnose. Keep replies under three sentences."),
        ("agent.md", "You are a morning companion."),
        ("persona.md", "Sam: warm, unhurried, a little wry."),
        ("voice.md", "Prefix every line with an emotion tag like [warm]."),
        ("memory.md", MEMORY_DOC),
        ("topics.md", "- sleep\n- the day ahead"),
    ];
    for (name, body) in files {
        std::fs::write(tmp.path().join(name), body).unwrap();
    }
    std::fs::create_dir(tmp.path().join("personas")).unwrap();
    std::fs::write(
        tmp.path().join("personas").join("dry-wit.md"),
        "Alex: deadpan, economical.",
    )
    .unwrap();
    tmp
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_morning_session() {
    let dir = agent_dir();
    let provider = Arc::new(ScriptedProvider::new(vec![OPENING, MIDDLE, CLOSING]));
    let settings = SessionSettings::new(dir.path()).with_weather("light rain, 9C");
    let session = SessionController::new(provider.clone(), settings);

    let tokens = session.start().await.unwrap();
    assert!(tokens > 0 && tokens < 3000);

    // Opening: streamed, fragments forwarded in order.
    let mut fragments = Vec::new();
    let opening = session
        .stream("[Session start]", |f| fragments.push(f.to_string()))
        .await
        .unwrap();
    assert!(fragments.len() > 1);
    assert_eq!(fragments.concat(), OPENING);
    assert_eq!(opening.display_text, "Morning. The kettle's on. How did you sleep?");
    let tags: Vec<_> = parse_emotion_lines(&opening.speech_text)
        .into_iter()
        .map(|l| l.tag)
        .collect();
    assert_eq!(tags, ["warm", "curious"]);

    // Middle: one-shot.
    let middle = session.send("Badly, big presentation today").await.unwrap();
    assert_eq!(middle.display_text, "That's rough. Want to ease in slowly today?");
    assert_eq!(parse_emotion_lines(&middle.speech_text).len(), 1);
    assert!(middle.memory_update.is_none());

    // Closing: memory block persisted, speech cleaned of it.
    let closing = session.stream("bye", |_| {}).await.unwrap();
    assert_eq!(closing.speech_text, "[warm] Go easy on yourself today.");
    assert!(closing.memory_update.is_some());

    let memory = std::fs::read_to_string(dir.path().join("memory.md")).unwrap();
    assert!(
        memory.starts_with("# User Memory\n\nName: Dana\nPrefers tea.\n\n## SESSION LOG\n\n### [")
    );
    let new_entry = memory.find("Slept badly before a big presentation").unwrap();
    let old_entry = memory.find("Started a new job").unwrap();
    assert!(new_entry < old_entry, "newest entry comes first");
    assert!(memory.ends_with("---END UPDATE---\n"));

    let budget = session.end().await.unwrap();
    assert_eq!(budget.threshold, 600);
    assert!(!budget.over_budget);
    assert!(budget.recommendation.starts_with("Memory is within budget"));
    assert_eq!(session.phase().await, SessionPhase::Ended);

    // The model saw the assembled prompt once, and the whole conversation each turn.
    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    let system = &requests[0].messages[0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.starts_with("Never diagnose."));
    assert!(system.content.contains("weather:      light rain, 9C"));
    assert!(system.content.contains("# User Memory\n# User Memory\n\nName: Dana"));
    assert!(
        system
            .content
            .ends_with("# Topic Bank (optional reference)\n- sleep\n- the day ahead")
    );

    let last = &requests[2].messages;
    assert_eq!(last.len(), 6);
    assert_eq!(last[2].content, OPENING);
    assert_eq!(last[4].content, MIDDLE);
    assert_eq!(last[5].content, "bye");
    assert!(requests.iter().all(|r| r.messages[0].content == system.content));
}

#[tokio::test]
async fn persona_override_reaches_the_model() {
    let dir = agent_dir();
    let provider = Arc::new(ScriptedProvider::new(vec!["[dry] Morning."]));
    let persona = dir.path().join("personas").join("dry-wit.md");
    let settings = SessionSettings::new(dir.path()).with_persona(persona);
    let session = SessionController::new(provider.clone(), settings);

    session.start().await.unwrap();
    session.send("hi").await.unwrap();

    let system = &provider.requests()[0].messages[0].content;
    assert!(system.contains("Alex: deadpan, economical."));
    assert!(!system.contains("Sam: warm"));
}

#[tokio::test]
async fn no_memory_write_leaves_document_untouched() {
    let dir = agent_dir();
    let provider = Arc::new(ScriptedProvider::new(vec![CLOSING]));
    let settings = SessionSettings::new(dir.path()).with_persist_memory(false);
    let session = SessionController::new(provider, settings);

    session.start().await.unwrap();
    let closing = session.send("bye").await.unwrap();
    assert!(closing.memory_update.is_some());
    session.end().await.unwrap();

    let memory = std::fs::read_to_string(dir.path().join("memory.md")).unwrap();
    assert_eq!(memory, MEMORY_DOC);
}

#[tokio::test]
async fn operations_outside_active_session_fail() {
    let dir = agent_dir();
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let session = SessionController::new(provider, SessionSettings::new(dir.path()));

    assert!(matches!(session.send("hi").await, Err(Error::SessionNotStarted)));
    assert!(matches!(session.end().await, Err(Error::SessionNotStarted)));

    session.start().await.unwrap();
    session.end().await.unwrap();
    assert!(matches!(session.stream("hi", |_| {}).await, Err(Error::SessionNotStarted)));
    assert!(matches!(session.start().await, Err(Error::SessionAlreadyStarted)));
}

#[tokio::test]
async fn oversized_memory_is_flagged_at_end() {
    let dir = agent_dir();
    let long_log = format!("{MEMORY_DOC}\n{}", "- another detail\n".repeat(200));
    std::fs::write(dir.path().join("memory.md"), long_log).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let session = SessionController::new(provider, SessionSettings::new(dir.path()));
    session.start().await.unwrap();

    let budget = session.end().await.unwrap();
    assert!(budget.over_budget);
    assert!(budget.recommendation.contains("ARCHIVED"));
}
