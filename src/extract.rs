// src/extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::pdf::{self, PdfText, PreparedPdf};
use crate::prompts::PromptSet;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{var} env var required for the {backend} backend")]
    MissingApiKey { backend: &'static str, var: &'static str },
    #[error("LLM server is not reachable at {url}")]
    Unreachable { url: String },
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("empty response from the model")]
    EmptyResponse,
    #[error("model blocked the request: {0}")]
    Blocked(String),
    #[error("model response is not a JSON object: {reason}\nRaw: {raw}")]
    MalformedJson { reason: String, raw: String },
    #[error("no text could be read from the PDF ({0}); use the gemini backend for scanned forms")]
    NoText(String),
}

/// The document-understanding service that turns a hearing request into JSON.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, document: &PreparedPdf, prompts: &PromptSet)
        -> Result<Value, ExtractionError>;

    /// Backend and model, for logs.
    fn describe(&self) -> String;
}

/// Build the extractor the configuration asks for.
pub async fn from_config(llm: &LlmSection) -> Result<Box<dyn Extractor>, ExtractionError> {
    let client = Client::new();
    let model = llm.model().to_string();
    let base_url = llm.base_url().to_string();
    info!(backend = ?llm.backend, model = %model, url = %base_url, "Resolving LLM backend");

    match llm.backend {
        LlmBackend::Gemini => {
            let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| ExtractionError::MissingApiKey {
                backend: "gemini",
                var: "GOOGLE_API_KEY",
            })?;
            Ok(Box::new(GeminiExtractor {
                client,
                base_url,
                model,
                api_key,
                settings: llm.clone(),
            }))
        }
        LlmBackend::OpenAi => {
            let api_key = std::env::var("LLM_API_KEY").map_err(|_| ExtractionError::MissingApiKey {
                backend: "openai",
                var: "LLM_API_KEY",
            })?;
            Ok(Box::new(ChatExtractor {
                client,
                base_url,
                model,
                api_key,
                temperature: llm.temperature,
            }))
        }
        LlmBackend::Ollama => {
            if !check_ollama_health(&client, &base_url).await {
                return Err(ExtractionError::Unreachable { url: base_url });
            }
            Ok(Box::new(ChatExtractor {
                client,
                base_url,
                model,
                // required by the API shape, ignored by Ollama
                api_key: "ollama".to_string(),
                temperature: llm.temperature,
            }))
        }
    }
}

async fn check_ollama_health(client: &Client, base_url: &str) -> bool {
    // Ollama answers on its root, not under /v1
    let health_url = base_url.trim_end_matches('/').trim_end_matches("/v1");

    match client
        .get(health_url)
        .timeout(std::time::Duration::from_secs(3))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            info!("Ollama server is reachable");
            true
        }
        Ok(resp) => {
            warn!(status = %resp.status(), "Ollama server returned non-OK status");
            false
        }
        Err(e) => {
            warn!(error = %e, "Ollama server not reachable");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Gemini (vision, PDF inlined)
// ---------------------------------------------------------------------------

pub struct GeminiExtractor {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    settings: LlmSection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiExtractor {
    fn request_body(&self, document: &PreparedPdf, prompts: &PromptSet) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": prompts.system_instruction }] },
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": "application/pdf", "data": STANDARD.encode(&document.bytes) } },
                    { "text": prompts.prompt }
                ]
            }],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topP": self.settings.top_p,
                "topK": self.settings.top_k,
                "maxOutputTokens": self.settings.max_output_tokens,
                "responseMimeType": "application/json",
                "responseSchema": prompts.schema
            }
        })
    }
}

#[async_trait]
impl Extractor for GeminiExtractor {
    async fn extract(
        &self,
        document: &PreparedPdf,
        prompts: &PromptSet,
    ) -> Result<Value, ExtractionError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        info!(file = %document.file_name, bytes = document.bytes.len(), "Sending PDF to Gemini");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(document, prompts))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api { status, body });
        }

        let generated: GenerateResponse = response.json().await?;
        if let Some(reason) = generated.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ExtractionError::Blocked(reason));
        }
        let text: String = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        parse_model_json(&text)
    }

    fn describe(&self) -> String {
        format!("gemini/{}", self.model)
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions (text only)
// ---------------------------------------------------------------------------

/// Text sent to text-only backends is capped to stay within context limits.
const MAX_TEXT_CHARS: usize = 12_000;

pub struct ChatExtractor {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl ChatExtractor {
    fn request(&self, text: &str, prompts: &PromptSet) -> ChatRequest {
        let schema = serde_json::to_string_pretty(&prompts.schema).unwrap_or_default();
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: format!(
                        "{}\n\nResponde SOLO con un objeto JSON que cumpla este schema:\n{schema}",
                        prompts.system_instruction
                    ),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "{}\n\nTexto extraído del PDF:\n\n{}",
                        prompts.prompt,
                        truncate_chars(text, MAX_TEXT_CHARS)
                    ),
                },
            ],
            temperature: self.temperature,
            response_format: json!({ "type": "json_object" }),
        }
    }
}

#[async_trait]
impl Extractor for ChatExtractor {
    async fn extract(
        &self,
        document: &PreparedPdf,
        prompts: &PromptSet,
    ) -> Result<Value, ExtractionError> {
        let text = match pdf::extract_text(&document.bytes) {
            PdfText::Text(text) => text,
            PdfText::Scanned => return Err(ExtractionError::NoText("scanned document".into())),
            PdfText::Error(e) => return Err(ExtractionError::NoText(e)),
        };
        info!(file = %document.file_name, chars = text.len(), "Sending PDF text to chat model");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request(&text, prompts))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        parse_model_json(&content)
    }

    fn describe(&self) -> String {
        format!("chat/{}", self.model)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Turn raw model output into a JSON object, tolerating markdown fences and
/// reasoning text around it.
pub fn parse_model_json(content: &str) -> Result<Value, ExtractionError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let unfenced = trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let malformed = |reason: String| ExtractionError::MalformedJson {
        reason,
        raw: trimmed.to_string(),
    };

    let object = extract_json_object(unfenced).ok_or_else(|| malformed("no JSON object found".into()))?;
    let value: Value = serde_json::from_str(object).map_err(|e| malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(malformed("top-level value is not an object".into()));
    }
    info!("Model response parsed");
    Ok(value)
}

/// The outermost `{ ... }` span of `s`.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}
