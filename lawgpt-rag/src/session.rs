//! Per-conversation state passed explicitly to the pipeline.
//!
//! A [`ChatSession`] owns one [`ConversationMemory`] (what the model sees as
//! history) and the full message log a user interface displays. Many sessions
//! can share one pipeline and one vector index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::{ConversationMemory, ConversationTurn, Role};

/// A message shown in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The speaker.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// When the message was recorded.
    pub created_at: DateTime<Utc>,
}

/// State for one conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    memory: ConversationMemory,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Start a session whose memory retains `memory_window` question/answer pairs.
    pub fn new(memory_window: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory: ConversationMemory::new(memory_window),
            messages: Vec::new(),
        }
    }

    /// Unique identifier, used to correlate log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The bounded history fed back to the model.
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Every message exchanged since the last reset, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Record a completed exchange in both memory and the transcript.
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.memory.append(ConversationTurn::user(question));
        self.memory.append(ConversationTurn::assistant(answer));

        let now = Utc::now();
        self.messages.push(ChatMessage {
            role: Role::User,
            content: question.to_string(),
            created_at: now,
        });
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: answer.to_string(),
            created_at: now,
        });
    }

    /// Clear memory and discard the transcript.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_outlives_memory_window() {
        let mut session = ChatSession::new(1);
        session.record_exchange("q1", "a1");
        session.record_exchange("q2", "a2");

        assert_eq!(session.messages().len(), 4);
        assert_eq!(session.memory().len(), 2);
        assert_eq!(session.messages()[0].content, "q1");
        assert_eq!(session.messages()[3].role, Role::Assistant);
    }

    #[test]
    fn reset_clears_memory_and_messages() {
        let mut session = ChatSession::new(2);
        let id = session.id();
        session.record_exchange("q1", "a1");
        session.reset();

        assert!(session.memory().is_empty());
        assert!(session.messages().is_empty());
        assert_eq!(session.id(), id);
    }
}
