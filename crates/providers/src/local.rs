//! On-device generation with Candle.
//!
//! Runs GGUF-quantized chat models on the CPU: no network after the first
//! download, no API key. Weights and tokenizers come from the HuggingFace
//! Hub cache, or from a local `.gguf` path with a `tokenizer.json` beside it.
//!
//! ```bash
//! dawnagent chat --local --model tinyllama
//! dawnagent chat --local --model /models/companion.gguf
//! ```

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qlm;
use dawnagent_core::error::ProviderError;
use dawnagent_core::message::{Message, Role};
use dawnagent_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use hf_hub::api::sync::Api;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DEFAULT_MAX_TOKENS: u32 = 512;
const SAMPLING_SEED: u64 = 42;

/// Friendly alias resolving to a HuggingFace repo and file.
struct ModelPreset {
    repo: &'static str,
    gguf_file: &'static str,
    tokenizer_repo: &'static str,
    chat_template: ChatTemplate,
}

/// Prompt layout expected by a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatTemplate {
    /// `<|system|>\n...</s>\n<|user|>\n...</s>\n<|assistant|>\n`
    Zephyr,
    /// `<|im_start|>role\n...<|im_end|>\n`
    ChatMl,
    /// `<|start_header_id|>role<|end_header_id|>\n\n...<|eot_id|>`
    Llama3,
}

impl ChatTemplate {
    /// Lay out the transcript and open an assistant turn.
    fn render(self, messages: &[Message]) -> String {
        let mut prompt = String::new();
        if self == ChatTemplate::Llama3 {
            prompt.push_str("<|begin_of_text|>");
        }

        for msg in messages {
            let role = role_label(msg.role);
            match self {
                ChatTemplate::Zephyr => {
                    prompt.push_str(&format!("<|{role}|>\n{}</s>\n", msg.content));
                }
                ChatTemplate::ChatMl => {
                    prompt.push_str(&format!("<|im_start|>{role}\n{}<|im_end|>\n", msg.content));
                }
                ChatTemplate::Llama3 => {
                    prompt.push_str(&format!(
                        "<|start_header_id|>{role}<|end_header_id|>\n\n{}<|eot_id|>",
                        msg.content
                    ));
                }
            }
        }

        prompt.push_str(match self {
            ChatTemplate::Zephyr => "<|assistant|>\n",
            ChatTemplate::ChatMl => "<|im_start|>assistant\n",
            ChatTemplate::Llama3 => "<|start_header_id|>assistant<|end_header_id|>\n\n",
        });
        prompt
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn resolve_preset(alias: &str) -> Option<ModelPreset> {
    match alias.to_lowercase().as_str() {
        "tinyllama" | "tinyllama-1.1b" => Some(ModelPreset {
            repo: "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF",
            gguf_file: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
            tokenizer_repo: "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
            chat_template: ChatTemplate::Zephyr,
        }),
        "smollm" | "smollm:360m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-360M-Instruct-GGUF",
            gguf_file: "smollm-360m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-360M-Instruct",
            chat_template: ChatTemplate::ChatMl,
        }),
        "smollm:1.7b" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-1.7B-Instruct-GGUF",
            gguf_file: "smollm-1.7b-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-1.7B-Instruct",
            chat_template: ChatTemplate::ChatMl,
        }),
        "llama3.2:1b" | "llama-3.2-1b" => Some(ModelPreset {
            repo: "bartowski/Llama-3.2-1B-Instruct-GGUF",
            gguf_file: "Llama-3.2-1B-Instruct-Q4_K_M.gguf",
            tokenizer_repo: "unsloth/Llama-3.2-1B-Instruct",
            chat_template: ChatTemplate::Llama3,
        }),
        _ => None,
    }
}

fn is_gguf_path(model: &str) -> bool {
    model.ends_with(".gguf") && Path::new(model).exists()
}

/// A provider running a quantized model in-process.
///
/// The weights sit behind a Mutex: one generation at a time.
pub struct LocalProvider {
    inner: Arc<Mutex<Option<LocalModelState>>>,
    model_name: String,
}

struct LocalModelState {
    model: qlm::ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    chat_template: ChatTemplate,
    eos_token_id: u32,
}

impl LocalProvider {
    /// `model_name` is a preset alias (`"tinyllama"`, `"llama3.2:1b"`) or a
    /// path to a `.gguf` file. Weights load lazily on first request.
    pub fn new(model_name: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            model_name: model_name.to_string(),
        }
    }

    /// Preset aliases accepted by [`LocalProvider::new`].
    pub fn presets() -> &'static [&'static str] {
        &["tinyllama", "smollm", "smollm:1.7b", "llama3.2:1b"]
    }

    async fn ensure_loaded(&self) -> Result<(), ProviderError> {
        let mut state = self.inner.lock().await;
        if state.is_some() {
            return Ok(());
        }

        info!(model = %self.model_name, "Loading local model on first request");
        let name = self.model_name.clone();
        let loaded = tokio::task::spawn_blocking(move || LocalModelState::load(&name))
            .await
            .map_err(|e| ProviderError::ApiError {
                status_code: 500,
                message: format!("Model loading task failed: {e}"),
            })??;
        *state = Some(loaded);
        Ok(())
    }
}

impl LocalModelState {
    fn load(model_name: &str) -> Result<Self, ProviderError> {
        let device = Device::Cpu;

        if is_gguf_path(model_name) {
            let path = Path::new(model_name);
            let tokenizer = load_sibling_tokenizer(path)?;
            return Self::from_files(path, tokenizer, ChatTemplate::ChatMl, device);
        }

        let preset = resolve_preset(model_name).ok_or_else(|| {
            ProviderError::ModelNotFound(format!(
                "Unknown local model '{model_name}'. Presets: {}. Or give a path to a .gguf file.",
                LocalProvider::presets().join(", ")
            ))
        })?;

        info!(repo = preset.repo, file = preset.gguf_file, "Fetching local model");
        let api = Api::new()
            .map_err(|e| ProviderError::Network(format!("HuggingFace Hub API error: {e}")))?;
        let model_path = api
            .model(preset.repo.to_string())
            .get(preset.gguf_file)
            .map_err(|e| {
                ProviderError::Network(format!(
                    "Failed to download '{}': {e}",
                    preset.gguf_file
                ))
            })?;
        let tokenizer_path = api
            .model(preset.tokenizer_repo.to_string())
            .get("tokenizer.json")
            .map_err(|e| {
                ProviderError::Network(format!(
                    "Failed to download tokenizer from '{}': {e}",
                    preset.tokenizer_repo
                ))
            })?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))?;

        Self::from_files(&model_path, tokenizer, preset.chat_template, device)
    }

    fn from_files(
        path: &Path,
        tokenizer: Tokenizer,
        chat_template: ChatTemplate,
        device: Device,
    ) -> Result<Self, ProviderError> {
        info!(path = %path.display(), "Loading GGUF weights");
        let mut file = std::fs::File::open(path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to open model file: {e}")))?;
        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to parse GGUF file: {e}")))?;
        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device)
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to load model weights: {e}"))
            })?;

        let eos_token_id = ["</s>", "<|im_end|>", "<|eot_id|>", "<|endoftext|>"]
            .iter()
            .find_map(|t| tokenizer.token_to_id(t))
            .unwrap_or(2);
        debug!(eos_token_id, ?chat_template, "Local model ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            chat_template,
            eos_token_id,
        })
    }

    /// Sample up to `max_tokens` tokens, handing each decoded text delta to
    /// `on_delta`. Generation stops early at EOS or when `on_delta` returns
    /// false. Returns the full text plus prompt and completion token counts.
    fn generate(
        &mut self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
        mut on_delta: impl FnMut(&str) -> bool,
    ) -> Result<(String, u32, u32), ProviderError> {
        let prompt = self.chat_template.render(messages);
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ProviderError::ApiError {
                status_code: 500,
                message: format!("Tokenization failed: {e}"),
            })?;
        let prompt_ids = encoding.get_ids();
        let prompt_tokens = prompt_ids.len() as u32;
        debug!(prompt_tokens, max_tokens, temperature, "Starting local generation");

        let sampling = (temperature > 0.0).then_some(f64::from(temperature));
        let mut logits_processor = LogitsProcessor::new(SAMPLING_SEED, sampling, None);

        let mut input = Tensor::new(prompt_ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut generated: Vec<u32> = Vec::new();
        let mut text = String::new();
        let mut position = 0usize;

        for _ in 0..max_tokens {
            let seq_len = input.dim(1).map_err(map_candle_err)?;
            let logits = self
                .model
                .forward(&input, position)
                .and_then(|l| l.squeeze(0))
                .map_err(map_candle_err)?;
            position += seq_len;

            let next = logits_processor.sample(&logits).map_err(map_candle_err)?;
            if next == self.eos_token_id {
                break;
            }
            generated.push(next);

            let decoded = self.decode(&generated)?;
            // Hold back while a multi-byte character is still incomplete.
            if decoded.len() > text.len() && !decoded.ends_with('\u{FFFD}') {
                if let Some(delta) = decoded.get(text.len()..) {
                    if !on_delta(delta) {
                        debug!("Receiver dropped, stopping generation");
                        break;
                    }
                }
                text = decoded;
            }

            input = Tensor::new(&[next][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
        }

        let completion_tokens = generated.len() as u32;
        let final_text = self.decode(&generated)?;
        if let Some(rest) = final_text.get(text.len()..).filter(|r| !r.is_empty()) {
            on_delta(rest);
        }
        debug!(completion_tokens, "Local generation complete");
        Ok((final_text, prompt_tokens, completion_tokens))
    }

    fn decode(&self, ids: &[u32]) -> Result<String, ProviderError> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| ProviderError::ApiError {
                status_code: 500,
                message: format!("Detokenization failed: {e}"),
            })
    }
}

fn load_sibling_tokenizer(model_path: &Path) -> Result<Tokenizer, ProviderError> {
    let tokenizer_path = model_path.with_file_name("tokenizer.json");
    if !tokenizer_path.exists() {
        warn!(path = %tokenizer_path.display(), "No tokenizer.json beside GGUF file");
        return Err(ProviderError::NotConfigured(format!(
            "expected tokenizer at {}",
            tokenizer_path.display()
        )));
    }
    Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))
}

fn map_candle_err(e: candle_core::Error) -> ProviderError {
    ProviderError::ApiError {
        status_code: 500,
        message: format!("Candle inference error: {e}"),
    }
}

fn usage(prompt_tokens: u32, completion_tokens: u32) -> Usage {
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

fn not_loaded() -> ProviderError {
    ProviderError::NotConfigured("local model is not loaded".into())
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.ensure_loaded().await?;

        let inner = self.inner.clone();
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = request.temperature;
        let messages = request.messages;
        let (output, prompt_tokens, completion_tokens) = tokio::task::spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            let state = guard.as_mut().ok_or_else(not_loaded)?;
            state.generate(&messages, max_tokens, temperature, |_| true)
        })
        .await
        .map_err(|e| ProviderError::ApiError {
            status_code: 500,
            message: format!("Inference task panicked: {e}"),
        })??;

        Ok(ProviderResponse {
            message: Message::assistant(output.trim()),
            usage: Some(usage(prompt_tokens, completion_tokens)),
            model: format!("local/{}", self.model_name),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.ensure_loaded().await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let inner = self.inner.clone();
        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = request.temperature;
        let messages = request.messages;

        tokio::task::spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            let result = match guard.as_mut() {
                Some(state) => state.generate(&messages, max_tokens, temperature, |delta| {
                    tx.blocking_send(Ok(StreamChunk::text(delta))).is_ok()
                }),
                None => Err(not_loaded()),
            };
            let last = result.map(|(_, p, c)| StreamChunk::finished(Some(usage(p, c))));
            let _ = tx.blocking_send(last);
        });

        Ok(rx)
    }

    /// Available when the model name resolves to a preset or a GGUF file.
    async fn health_check(&self) -> Result<bool, ProviderError> {
        if self.inner.lock().await.is_some() {
            return Ok(true);
        }
        Ok(resolve_preset(&self.model_name).is_some() || is_gguf_path(&self.model_name))
    }
}
