//! Append-only conversation log
//!
//! Append order is render order. Entries are never edited or removed once
//! they are in the log.

use crate::chart::ChartPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl MessageId {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

/// System entries are bot messages announcing a session event rather than
/// answering a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    Chat,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    role: Role,
    tag: MessageTag,
    text: String,
    chart: Option<ChartPayload>,
}

impl Message {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tag(&self) -> MessageTag {
        self.tag
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chart(&self) -> Option<&ChartPayload> {
        self.chart.as_ref()
    }
}

/// A message that has not been given an identity yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub tag: MessageTag,
    pub text: String,
    pub chart: Option<ChartPayload>,
}

impl NewMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            tag: MessageTag::Chat,
            text: text.into(),
            chart: None,
        }
    }

    pub fn bot(text: impl Into<String>, chart: Option<ChartPayload>) -> Self {
        Self {
            role: Role::Bot,
            tag: MessageTag::Chat,
            text: text.into(),
            chart,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            tag: MessageTag::System,
            text: text.into(),
            chart: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: NewMessage) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role: message.role,
            tag: message.tag,
            text: message.text,
            chart: message.chart,
        });
        id
    }

    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
