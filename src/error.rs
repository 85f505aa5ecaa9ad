use thiserror::Error;

use crate::LLMError;

/// failures raised by session collaborators and configuration.
///
/// the `Display` text is what ends up in the transcript after `"Error: "`,
/// so variants carry the provider's description verbatim where possible.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Provider(#[from] LLMError),

    #[error("{0}")]
    Session(String),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("unknown llm backend '{0}'")]
    UnknownBackend(String),

    #[error("invalid chat config: {0}")]
    Config(#[from] serde_json::Error),
}

impl ChatError {
    pub fn session(description: impl Into<String>) -> Self {
        Self::Session(description.into())
    }
}
