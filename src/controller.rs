//! readiness state machine and the send lifecycle.
//!
//! the synchronous halves of each operation live here so they can be tested
//! without an `App`; the plugin systems in `lib.rs` only spawn the async
//! collaborator calls in between and feed their results back.

use bevy::prelude::*;
use std::fmt;
use std::sync::Arc;

use crate::config::SendPolicy;
use crate::error::ChatError;
use crate::message::Origin;
use crate::model::{Availability, ModelSession, UnavailableReason};
use crate::store::ConversationStore;

pub const STATUS_READY: &str = "Model ready.";
pub const STATUS_DEVICE_NOT_ELIGIBLE: &str = "Device not eligible for the language model.";
pub const STATUS_FEATURE_NOT_ENABLED: &str = "Please enable the language model in Settings.";
pub const STATUS_MODEL_NOT_READY: &str = "Model not ready (downloading or unavailable).";
pub const STATUS_UNKNOWN: &str = "Unknown error: model unavailable.";

/// prefix of the assistant entry that reports a failed reply.
pub const ERROR_PREFIX: &str = "Error: ";

/// tab or a space separator. line breaks are content, so `"\n"` is sendable.
fn is_inline_whitespace(c: char) -> bool {
    c == '\t' || (c.is_whitespace() && !c.is_control() && c != '\u{2028}' && c != '\u{2029}')
}

/// true when the draft holds nothing but spaces and tabs.
pub fn is_blank_draft(draft: &str) -> bool {
    draft.trim_matches(is_inline_whitespace).is_empty()
}

/// maps an availability answer to the status line.
pub fn status_for(availability: &Availability) -> &'static str {
    match availability {
        Availability::Available => STATUS_READY,
        Availability::Unavailable(UnavailableReason::DeviceNotEligible) => STATUS_DEVICE_NOT_ELIGIBLE,
        Availability::Unavailable(UnavailableReason::FeatureNotEnabled) => STATUS_FEATURE_NOT_ENABLED,
        Availability::Unavailable(UnavailableReason::ModelNotReady) => STATUS_MODEL_NOT_READY,
        Availability::Unavailable(UnavailableReason::Other(_)) => STATUS_UNKNOWN,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModelPhase {
    #[default]
    Uninitialized,
    Checking,
    Ready,
    Unavailable(UnavailableReason),
}

/// a send that passed its preconditions; `prompt` still has to be answered.
pub struct PendingSend {
    pub session: Arc<dyn ModelSession>,
    pub prompt: String,
}

impl PendingSend {
    pub async fn run(self) -> Result<String, ChatError> {
        self.session.respond(&self.prompt).await.map(|r| r.content)
    }
}

/// owns the session handle and the lifecycle phase.
#[derive(Resource, Default)]
pub struct ChatController {
    session: Option<Arc<dyn ModelSession>>,
    phase: ModelPhase,
    in_flight: usize,
}

impl fmt::Debug for ChatController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatController")
            .field("has_session", &self.session.is_some())
            .field("phase", &self.phase)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl ChatController {
    pub fn phase(&self) -> &ModelPhase {
        &self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    /// number of sends still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// `Uninitialized -> Checking`. false when a check already ran.
    pub fn begin_check(&mut self) -> bool {
        if self.phase != ModelPhase::Uninitialized {
            return false;
        }
        self.phase = ModelPhase::Checking;
        true
    }

    /// `Checking -> Ready`. a second session is never accepted.
    pub fn finish_check_ready(
        &mut self,
        session: Arc<dyn ModelSession>,
        store: &mut ConversationStore,
    ) {
        if self.phase != ModelPhase::Checking {
            warn!(target: "bevy_llm_chat", "dropping session delivered in phase {:?}", self.phase);
            return;
        }
        self.session = Some(session);
        self.phase = ModelPhase::Ready;
        store.set_status(status_for(&Availability::Available));
    }

    /// `Checking -> Unavailable(reason)`. no session is kept.
    pub fn finish_check_unavailable(
        &mut self,
        reason: UnavailableReason,
        store: &mut ConversationStore,
    ) {
        if self.phase != ModelPhase::Checking {
            warn!(target: "bevy_llm_chat", "dropping availability result in phase {:?}", self.phase);
            return;
        }
        let availability = Availability::Unavailable(reason.clone());
        store.set_status(status_for(&availability));
        self.phase = ModelPhase::Unavailable(reason);
    }

    /// synchronous half of a send: guard, append the user entry, clear the
    /// draft. `None` means nothing was touched.
    pub fn begin_send(
        &mut self,
        store: &mut ConversationStore,
        policy: SendPolicy,
    ) -> Option<PendingSend> {
        if is_blank_draft(store.draft()) {
            return None;
        }
        let session = self.session.clone()?;
        if policy == SendPolicy::RejectWhileAwaiting && self.in_flight > 0 {
            return None;
        }

        let prompt = store.draft().to_string();
        store.append_message(prompt.clone(), Origin::User);
        store.set_draft("");
        self.in_flight += 1;

        Some(PendingSend { session, prompt })
    }

    /// asynchronous half of a send: always appends exactly one assistant entry.
    pub fn finish_send(&mut self, outcome: Result<String, String>, store: &mut ConversationStore) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let content = match outcome {
            Ok(content) => content,
            Err(description) => format!("{ERROR_PREFIX}{description}"),
        };
        store.append_message(content, Origin::Assistant);
    }
}
