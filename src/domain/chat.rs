//! Chat log turns.
//!
//! Turns carry no chain guarantees: they are inserted per message and purged
//! wholesale per session. The session id is an opaque partition key supplied
//! by the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{AnswerConfidence, SourceSummary};

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Bot,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Bot => "bot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ChatRole::User),
            "bot" => Some(ChatRole::Bot),
            _ => None,
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub id: Uuid,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<AnswerConfidence>,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role: ChatRole::User,
            content: content.into(),
            sources: Vec::new(),
            confidence: None,
            created_at: Utc::now(),
        }
    }

    pub fn bot(
        session_id: impl Into<String>,
        content: impl Into<String>,
        sources: Vec<SourceSummary>,
        confidence: AnswerConfidence,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role: ChatRole::Bot,
            content: content.into(),
            sources,
            confidence: Some(confidence),
            created_at: Utc::now(),
        }
    }
}
