use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::LLMBackend;

/// what to do with a send while an earlier reply is still outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// overlapping requests are allowed; replies land in resolution order.
    #[default]
    Concurrent,
    /// a send during an in-flight request is a silent no-op.
    RejectWhileAwaiting,
}

/// plugin + backend configuration.
///
/// - `backend`: an `llm` backend name (`openai`, `ollama`, `anthropic`, ...)
/// - `memory_window`: sliding-window history kept by the provider; 0 disables
/// - `auto_initialize`: request the availability check at startup
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub backend: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub memory_window: usize,
    pub send_policy: SendPolicy,
    pub auto_initialize: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: "openai".to_string(),
            base_url: None,
            api_key: None,
            model: "gpt-5".to_string(),
            system_prompt: None,
            memory_window: 32,
            send_policy: SendPolicy::default(),
            auto_initialize: true,
        }
    }
}

impl ChatConfig {
    /// seeds the config from process env, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// like `from_env`, but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(backend) = non_empty("LLM_BACKEND") {
            cfg.backend = backend;
        }
        cfg.base_url = non_empty("LLM_BASE_URL");
        cfg.api_key = non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
        if let Some(model) = non_empty("LLM_MODEL") {
            cfg.model = model;
        }
        cfg.system_prompt = non_empty("LLM_SYSTEM_PROMPT");
        if let Some(window) = non_empty("LLM_MEMORY_WINDOW") {
            match window.trim().parse() {
                Ok(n) => cfg.memory_window = n,
                Err(_) => warn!(target: "bevy_llm_chat",
                    "ignoring LLM_MEMORY_WINDOW='{}' (not a number)", window),
            }
        }
        cfg
    }

    pub fn from_json(text: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn llm_backend(&self) -> Result<LLMBackend, ChatError> {
        self.backend
            .trim()
            .parse::<LLMBackend>()
            .map_err(|_| ChatError::UnknownBackend(self.backend.clone()))
    }
}

/// openai-compatible providers expect the base to end in `/v1/`.
pub fn normalize_oai_base(base: &str) -> String {
    let b = base.trim_end_matches('/');
    if b.ends_with("/v1") {
        format!("{b}/")
    } else {
        format!("{b}/v1/")
    }
}
