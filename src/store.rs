//! conversation state: transcript, draft and readiness status.
//!
//! every mutation is also recorded in a change log. the plugin drains that log
//! once per frame and republishes it as `ConversationChanged` events, so
//! presentation code subscribes to events instead of diffing the resource.

use bevy::prelude::*;

use crate::message::{Message, Origin};

/// status shown before the availability check has reported.
pub const STATUS_INITIALIZING: &str = "Initializing model...";

/// one observable mutation of the store.
#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub enum ConversationChanged {
    MessageAppended(Message),
    DraftChanged(String),
    StatusChanged(String),
}

#[derive(Resource, Debug)]
pub struct ConversationStore {
    messages: Vec<Message>,
    draft: String,
    status: String,
    changes: Vec<ConversationChanged>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            draft: String::new(),
            status: STATUS_INITIALIZING.to_string(),
            changes: Vec::new(),
        }
    }
}

impl ConversationStore {
    /// appends a new message and returns a copy of it.
    pub fn append_message(&mut self, content: impl Into<String>, origin: Origin) -> Message {
        let message = Message::new(content, origin);
        self.messages.push(message.clone());
        self.changes
            .push(ConversationChanged::MessageAppended(message.clone()));
        message
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
        self.changes
            .push(ConversationChanged::DraftChanged(self.draft.clone()));
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = text.into();
        self.changes
            .push(ConversationChanged::StatusChanged(self.status.clone()));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// hands out the change log accumulated since the last call, oldest first.
    pub fn take_changes(&mut self) -> Vec<ConversationChanged> {
        std::mem::take(&mut self.changes)
    }
}
