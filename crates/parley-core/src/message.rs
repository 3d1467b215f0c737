//! Message and archive primitives.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions, summaries). Never archived.
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

impl Role {
    /// Wire and storage name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(crate::Error::Validation(format!(
                "Unknown role '{}'. Valid roles: system, user, assistant",
                other
            ))),
        }
    }
}

/// A message in a conversation's active set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Message role
    pub role: Role,
    /// Message text
    pub content: String,
    /// Token count; `None` until the first accounting pass
    pub token_count: Option<u32>,
    /// Whether this message is a compaction summary
    #[serde(default)]
    pub is_summary: bool,
    /// Position in the conversation's canonical order
    pub sequence: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message. The sequence is assigned by the store on append.
    pub fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            token_count: None,
            is_summary: false,
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::System, content)
    }

    /// Create a compaction summary that takes the place of the archived block
    /// ending at `sequence`.
    pub fn summary(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        token_count: u32,
        sequence: i64,
    ) -> Self {
        Self {
            token_count: Some(token_count),
            is_summary: true,
            sequence,
            ..Self::new(conversation_id, Role::System, content)
        }
    }

    /// Set the token count.
    pub fn with_token_count(mut self, token_count: u32) -> Self {
        self.token_count = Some(token_count);
        self
    }

    /// Check if this message may be archived by compaction.
    pub fn is_protected(&self) -> bool {
        self.role == Role::System
    }
}

/// Archived copy of a message that was replaced by a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageArchive {
    /// Archive record ID
    pub id: String,
    /// ID of the message this record preserves
    pub original_message_id: String,
    /// Owning conversation
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub token_count: Option<u32>,
    pub is_summary: bool,
    pub sequence: i64,
    /// Creation timestamp of the original message
    pub original_created_at: DateTime<Utc>,
    /// When the record was written
    pub archived_at: DateTime<Utc>,
    /// Summary message that replaced the original
    pub summary_message_id: String,
}

impl MessageArchive {
    /// Copy a message into an archive record linked to `summary_message_id`.
    pub fn from_message(
        message: &Message,
        summary_message_id: impl Into<String>,
        archived_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_message_id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            role: message.role,
            content: message.content.clone(),
            token_count: message.token_count,
            is_summary: message.is_summary,
            sequence: message.sequence,
            original_created_at: message.created_at,
            archived_at,
            summary_message_id: summary_message_id.into(),
        }
    }

    /// Rebuild the original message.
    pub fn to_message(&self) -> Message {
        Message {
            id: self.original_message_id.clone(),
            conversation_id: self.conversation_id.clone(),
            role: self.role,
            content: self.content.clone(),
            token_count: self.token_count,
            is_summary: self.is_summary,
            sequence: self.sequence,
            created_at: self.original_created_at,
        }
    }
}
