use std::fmt;

use uuid::Uuid;

/// process-local unique id for one transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// which party produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    User,
    Assistant,
}

/// one immutable transcript entry. fields are private so entries can only be
/// created, never edited, once they are in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    content: String,
    origin: Origin,
}

impl Message {
    pub fn new(content: impl Into<String>, origin: Origin) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            origin,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, Origin::User)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, Origin::Assistant)
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_user(&self) -> bool {
        self.origin == Origin::User
    }
}
