//! Sliding-window conversation memory.
//!
//! [`ConversationMemory`] keeps the last `k` question/answer pairs. Turns are
//! grouped into pairs as they arrive: a user turn opens a pair and the next
//! assistant turn closes it. Eviction always removes a whole pair, oldest
//! first, so a question is never retained without its answer or vice versa.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The assistant answering them.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    /// The speaker.
    pub role: Role,
    /// The message text.
    pub text: String,
}

impl ConversationTurn {
    /// A turn spoken by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    /// A turn spoken by the assistant.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TurnPair {
    question: Option<ConversationTurn>,
    answer: Option<ConversationTurn>,
}

/// A bounded history of the most recent question/answer pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMemory {
    window: usize,
    pairs: VecDeque<TurnPair>,
}

impl ConversationMemory {
    /// Create a memory that retains at most `window` pairs (`2 * window` turns).
    ///
    /// A window of zero is treated as one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self { window, pairs: VecDeque::with_capacity(window + 1) }
    }

    /// The number of pairs retained.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Record a turn, evicting the oldest pair if the window is exceeded.
    ///
    /// A user turn always opens a new pair. An assistant turn closes the most
    /// recent pair if it is still waiting for an answer, and otherwise forms a
    /// pair of its own.
    pub fn append(&mut self, turn: ConversationTurn) {
        match turn.role {
            Role::User => self.pairs.push_back(TurnPair { question: Some(turn), answer: None }),
            Role::Assistant => match self.pairs.back_mut() {
                Some(pair) if pair.question.is_some() && pair.answer.is_none() => {
                    pair.answer = Some(turn);
                }
                _ => self.pairs.push_back(TurnPair { question: None, answer: Some(turn) }),
            },
        }
        while self.pairs.len() > self.window {
            self.pairs.pop_front();
        }
    }

    /// Record a completed exchange as one pair.
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.append(ConversationTurn::user(question));
        self.append(ConversationTurn::assistant(answer));
    }

    /// Retained turns, oldest first; at most `2 * window` entries.
    pub fn recent(&self) -> Vec<ConversationTurn> {
        self.pairs
            .iter()
            .flat_map(|pair| pair.question.iter().chain(pair.answer.iter()))
            .cloned()
            .collect()
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.pairs
            .iter()
            .map(|pair| usize::from(pair.question.is_some()) + usize::from(pair.answer.is_some()))
            .sum()
    }

    /// Whether no turns are retained.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Forget every turn.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_k_pairs() {
        let mut memory = ConversationMemory::new(2);
        memory.append_exchange("q1", "a1");
        memory.append_exchange("q2", "a2");
        memory.append_exchange("q3", "a3");

        let recent = memory.recent();
        assert_eq!(recent.len(), 4);
        assert_eq!(
            recent,
            vec![
                ConversationTurn::user("q2"),
                ConversationTurn::assistant("a2"),
                ConversationTurn::user("q3"),
                ConversationTurn::assistant("a3"),
            ]
        );
    }

    #[test]
    fn eviction_never_splits_a_pair() {
        let mut memory = ConversationMemory::new(1);
        memory.append_exchange("q1", "a1");
        memory.append(ConversationTurn::user("q2"));

        // The open question displaces the whole first pair.
        assert_eq!(memory.recent(), vec![ConversationTurn::user("q2")]);

        memory.append(ConversationTurn::assistant("a2"));
        assert_eq!(
            memory.recent(),
            vec![ConversationTurn::user("q2"), ConversationTurn::assistant("a2")]
        );
    }

    #[test]
    fn orphan_assistant_turn_forms_its_own_pair() {
        let mut memory = ConversationMemory::new(2);
        memory.append(ConversationTurn::assistant("welcome"));
        memory.append_exchange("q1", "a1");
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.recent()[0], ConversationTurn::assistant("welcome"));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut memory = ConversationMemory::new(2);
        memory.append_exchange("q1", "a1");
        memory.clear();
        assert!(memory.is_empty());
        assert!(memory.recent().is_empty());
    }

    #[test]
    fn zero_window_behaves_as_one() {
        let mut memory = ConversationMemory::new(0);
        memory.append_exchange("q1", "a1");
        memory.append_exchange("q2", "a2");
        assert_eq!(memory.window(), 1);
        assert_eq!(memory.len(), 2);
    }
}
