//! `LanguageModel` over the `llm` crate's providers.
//!
//! api docs: https://docs.rs/llm
//!   - builder:        `llm::builder::{LLMBuilder, LLMBackend}`
//!   - chat:           `llm::chat::{ChatProvider, ChatMessage}`
//!
//! the provider keeps conversation history itself (sliding-window memory), so
//! each `respond` only sends the new user message.

use async_trait::async_trait;
use bevy::prelude::*;
use std::any::type_name_of_val;
use std::sync::Arc;

use crate::config::{normalize_oai_base, ChatConfig};
use crate::error::ChatError;
use crate::model::{Availability, LanguageModel, ModelResponse, ModelSession, UnavailableReason};
use crate::{ChatMessage, ChatProvider, LLMBackend, LLMBuilder, LLMProvider};

/// local backends run without credentials.
fn requires_api_key(backend: &LLMBackend) -> bool {
    !matches!(backend, LLMBackend::Ollama)
}

pub struct LlmModel {
    config: ChatConfig,
}

impl LlmModel {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }

    fn build_provider(&self) -> Result<Arc<dyn LLMProvider>, ChatError> {
        let backend = self.config.llm_backend()?;
        let is_openai = matches!(backend, LLMBackend::OpenAI);
        info!(
            target: "bevy_llm_chat",
            "build_provider: backend='{}', model='{}', base_url={:?}, key_present={}, memory_window={}",
            self.config.backend,
            self.config.model,
            self.config.base_url,
            self.config.api_key.is_some(),
            self.config.memory_window
        );

        let mut b = LLMBuilder::new()
            .backend(backend)
            .model(self.config.model.clone());
        if let Some(base) = &self.config.base_url {
            let base = if is_openai { normalize_oai_base(base) } else { base.clone() };
            b = b.base_url(base);
        }
        if let Some(key) = &self.config.api_key {
            b = b.api_key(key.clone());
        }
        if let Some(system) = &self.config.system_prompt {
            b = b.system(system.clone());
        }
        if self.config.memory_window > 0 {
            b = b.sliding_window_memory(self.config.memory_window);
        }
        Ok(b.build()?.into())
    }
}

#[async_trait]
impl LanguageModel for LlmModel {
    async fn availability(&self) -> Availability {
        let backend = match self.config.llm_backend() {
            Ok(b) => b,
            Err(err) => return Availability::Unavailable(UnavailableReason::Other(err.to_string())),
        };

        // a browser tab cannot reach a local model server
        #[cfg(target_arch = "wasm32")]
        if matches!(backend, LLMBackend::Ollama) {
            return Availability::Unavailable(UnavailableReason::DeviceNotEligible);
        }

        if requires_api_key(&backend) && self.config.api_key.is_none() {
            return Availability::Unavailable(UnavailableReason::FeatureNotEnabled);
        }
        if self.config.model.trim().is_empty() {
            return Availability::Unavailable(UnavailableReason::ModelNotReady);
        }
        Availability::Available
    }

    async fn create_session(&self) -> Result<Arc<dyn ModelSession>, ChatError> {
        let provider = self.build_provider()?;
        Ok(Arc::new(LlmSession { provider }))
    }
}

pub struct LlmSession {
    provider: Arc<dyn LLMProvider>,
}

#[async_trait]
impl ModelSession for LlmSession {
    async fn prewarm(&self) {
        // remote providers load lazily on the first request
        debug!(
            target: "bevy_llm_chat",
            "prewarm: nothing to do for provider {}",
            type_name_of_val(self.provider.as_ref())
        );
    }

    async fn respond(&self, prompt: &str) -> Result<ModelResponse, ChatError> {
        let messages = vec![ChatMessage::user().content(prompt.to_string()).build()];
        let resp = self.provider.chat(&messages).await?;
        let text = resp.text().unwrap_or_default().to_string();
        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(ModelResponse::new(text))
    }
}
