use serde::Deserialize;
use std::collections::BTreeMap;
use std::{fs, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub prompts: PromptsSection,
    pub processing: ProcessingSection,
    pub validation: ValidationSection,
    pub webhook: WebhookSection,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "gemini" => Some(LlmBackend::Gemini),
            "openai" => Some(LlmBackend::OpenAi),
            "ollama" => Some(LlmBackend::Ollama),
            _ => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmBackend::Gemini => "gemini-2.0-flash-001",
            LlmBackend::OpenAi => "gpt-4.1-mini",
            LlmBackend::Ollama => "qwen3:8b",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            LlmBackend::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            LlmBackend::OpenAi => "https://api.openai.com/v1",
            LlmBackend::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: LlmBackend,
    /// Falls back to the backend's default model when unset.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Gemini,
            model: None,
            base_url: None,
            temperature: 0.1,
            top_p: 0.8,
            top_k: 20,
            max_output_tokens: 8192,
        }
    }
}

impl LlmSection {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.backend.default_base_url())
            .trim_end_matches('/')
    }
}

/// Overrides for the shared prompt text in [`crate::prompts`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptsSection {
    pub prompt: Option<String>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingSection {
    /// Only this many leading pages are sent for extraction.
    pub max_pages: usize,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self { max_pages: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub require_convocantes: bool,
    pub require_convocados: bool,
    pub validate_email_format: bool,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            require_convocantes: true,
            require_convocados: true,
            validate_email_format: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookSection {
    pub enabled: bool,
    pub url: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Extra request headers, e.g. an auth token for the receiving workflow.
    pub headers: BTreeMap<String, String>,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_secs: 60,
            user_agent: "Legal-Document-Extractor/2.0".to_string(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub root: PathBuf,
    pub prefix: String,
    pub public_base_url: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
            prefix: "uploads".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Config {
    /// Load the TOML file at `path`, or defaults when it does not exist,
    /// then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut cfg = if path.exists() {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };
        cfg.apply_env(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay deployment settings supplied through the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("LLM_BACKEND") {
            self.llm.backend = LlmBackend::parse(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "LLM_BACKEND '{raw}' is not one of gemini, openai, ollama"
                ))
            })?;
        }
        if let Some(model) = lookup("MODEL_NAME") {
            self.llm.model = Some(model);
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(prompt) = lookup("PROMPT") {
            self.prompts.prompt = Some(prompt);
        }
        if let Some(instruction) = lookup("SYS_INSTRUCTION") {
            self.prompts.system_instruction = Some(instruction);
        }
        if let Some(raw) = lookup("MAX_PAGES") {
            self.processing.max_pages = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("MAX_PAGES '{raw}' is not a page count"))
            })?;
        }
        if let Some(url) = lookup("WEBHOOK_URL") {
            self.webhook.url = Some(url);
            self.webhook.enabled = true;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.max_pages == 0 {
            return Err(ConfigError::Invalid(
                "processing.max_pages must be at least 1".into(),
            ));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "webhook.timeout_secs must be at least 1".into(),
            ));
        }
        if self.webhook.enabled && self.webhook.url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Invalid(
                "webhook.enabled is set but webhook.url is missing".into(),
            ));
        }
        Ok(())
    }
}
