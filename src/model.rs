//! the language-model collaborator contract.
//!
//! the controller never talks to a provider directly; it goes through these
//! traits so the `llm` backend and test doubles are interchangeable.

use async_trait::async_trait;
use bevy::prelude::*;
use std::sync::Arc;

use crate::error::ChatError;

/// why a model cannot be used right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    DeviceNotEligible,
    FeatureNotEnabled,
    ModelNotReady,
    Other(String),
}

/// answer of the one-shot availability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(UnavailableReason),
}

/// a complete reply to one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
}

impl ModelResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }
}

/// source of sessions: checked once, then asked for a single session.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn availability(&self) -> Availability;

    async fn create_session(&self) -> Result<Arc<dyn ModelSession>, ChatError>;
}

/// an initialized session. it owns whatever conversation memory the
/// underlying model keeps between prompts.
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// best effort; failures are the implementation's to log and swallow.
    async fn prewarm(&self);

    /// one round trip, no streaming.
    async fn respond(&self, prompt: &str) -> Result<ModelResponse, ChatError>;
}

/// the model the plugin initializes against. insert before `InitializeModel`
/// is handled (startup, by default).
#[derive(Resource, Clone)]
pub struct LanguageModelHandle(pub Arc<dyn LanguageModel>);

impl LanguageModelHandle {
    pub fn new(model: impl LanguageModel + 'static) -> Self {
        Self(Arc::new(model))
    }
}
