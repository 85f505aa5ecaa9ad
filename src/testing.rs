//! scripted collaborators for tests.

use async_trait::async_trait;
use flume::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ChatError;
use crate::model::{Availability, LanguageModel, ModelResponse, ModelSession};

/// session that answers from a queue of canned replies, optionally holding
/// every reply until the test releases it.
#[derive(Default)]
pub struct ScriptedSession {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    prewarmed: AtomicBool,
    gate: Option<Receiver<()>>,
}

impl ScriptedSession {
    pub fn replying<const N: usize>(replies: [&str; N]) -> Self {
        let session = Self::default();
        for r in replies {
            session.queue_reply(r);
        }
        session
    }

    /// replies wait for one `send(())` on the returned sender each.
    pub fn gated() -> (Self, Sender<()>) {
        let (tx, rx) = flume::unbounded();
        let session = Self {
            gate: Some(rx),
            ..Self::default()
        };
        (session, tx)
    }

    pub fn queue_reply(&self, content: &str) {
        self.replies.lock().unwrap().push_back(Ok(content.to_string()));
    }

    pub fn queue_error(&self, description: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(description.to_string()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn was_prewarmed(&self) -> bool {
        self.prewarmed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelSession for ScriptedSession {
    async fn prewarm(&self) {
        self.prewarmed.store(true, Ordering::SeqCst);
    }

    async fn respond(&self, prompt: &str) -> Result<ModelResponse, ChatError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(gate) = &self.gate {
            let _ = gate.recv_async().await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(ModelResponse::new(content)),
            Some(Err(description)) => Err(ChatError::session(description)),
            None => Err(ChatError::session("no scripted reply")),
        }
    }
}

/// model with a fixed availability answer that always hands out `session`.
pub struct ScriptedModel {
    availability: Availability,
    session: Arc<ScriptedSession>,
    session_error: Option<String>,
    sessions_created: AtomicUsize,
}

impl ScriptedModel {
    pub fn available(session: Arc<ScriptedSession>) -> Self {
        Self {
            availability: Availability::Available,
            session,
            session_error: None,
            sessions_created: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(availability: Availability) -> Self {
        Self {
            availability,
            ..Self::available(Arc::default())
        }
    }

    pub fn failing_session(mut self, description: &str) -> Self {
        self.session_error = Some(description.to_string());
        self
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn availability(&self) -> Availability {
        self.availability.clone()
    }

    async fn create_session(&self) -> Result<Arc<dyn ModelSession>, ChatError> {
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        if let Some(description) = &self.session_error {
            return Err(ChatError::session(description.clone()));
        }
        let session: Arc<dyn ModelSession> = self.session.clone();
        Ok(session)
    }
}
