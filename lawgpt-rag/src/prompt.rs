//! Prompt assembly for conversational retrieval.

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::memory::{ConversationTurn, Role};

const CONTEXT: &str = "{context}";
const CHAT_HISTORY: &str = "{chat_history}";
const QUESTION: &str = "{question}";

/// The default answer prompt: a concise legal assistant for the Indian Penal Code.
pub const DEFAULT_LEGAL_TEMPLATE: &str = concat!(
    "<s>[INST]\n",
    "As a legal chatbot with expertise in the Indian Penal Code, your primary objective is to ",
    "deliver precise, accurate, and succinct responses to user inquiries. ",
    "Please adhere to these guidelines:\n",
    "- Respond in a bullet-point format to ensure clarity and brevity.\n",
    "- Directly and accurately address the user's question with relevant information.\n",
    "- Avoid providing additional information beyond what is necessary to answer the question.\n",
    "- Do not generate content unrelated to the user's current question.\n",
    "- Utilize available information to respond to queries outside our direct knowledge base, ",
    "focusing solely on the user's current question without referring back to chat history.\n",
    "- Ensure that your responses are strictly relevant to the context provided ",
    "and the specific question asked.\n",
    "\n",
    "CONTEXT: {context}\n",
    "CHAT HISTORY: {chat_history}\n",
    "QUESTION: {question}\n",
    "ANSWER:\n",
    "- [Provide answers in bullet points]\n",
    "\n",
    "</s>[INST]\n",
);

/// Prompt used to turn a follow-up into a standalone question before retrieval.
pub const DEFAULT_CONDENSE_TEMPLATE: &str = concat!(
    "Given the following conversation and a follow up question, ",
    "rephrase the follow up question to be a standalone question, in its original language.\n",
    "\n",
    "Chat History:\n",
    "{chat_history}\n",
    "Follow Up Input: {question}\n",
    "Standalone question:",
);

/// A text template with `{context}`, `{chat_history}`, and `{question}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_LEGAL_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Use a custom answer template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] unless the template contains
    /// `{context}`, `{chat_history}`, and `{question}`.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for slot in [CONTEXT, CHAT_HISTORY, QUESTION] {
            if !template.contains(slot) {
                return Err(RagError::InvalidConfiguration(format!(
                    "prompt template is missing the {slot} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill the template with retrieved chunks, history, and the question.
    ///
    /// Substitution is single-pass, so placeholder-like text inside the
    /// retrieved chunks or the question is left untouched.
    pub fn render(
        &self,
        results: &[SearchResult],
        history: &[ConversationTurn],
        question: &str,
    ) -> String {
        let context = format_context(results);
        let chat_history = format_history(history);
        substitute(
            &self.template,
            &[(CONTEXT, &context), (CHAT_HISTORY, &chat_history), (QUESTION, question)],
        )
    }
}

/// Fill the condense template for a follow-up question.
pub fn render_condense(history: &[ConversationTurn], question: &str) -> String {
    let chat_history = format_history(history);
    substitute(DEFAULT_CONDENSE_TEMPLATE, &[(CHAT_HISTORY, &chat_history), (QUESTION, question)])
}

/// Join retrieved chunk texts, separated by blank lines.
pub fn format_context(results: &[SearchResult]) -> String {
    results.iter().map(|r| r.chunk.text.trim()).collect::<Vec<_>>().join("\n\n")
}

/// Render turns as `Human:` / `AI:` lines.
pub fn format_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("Human: {}", turn.text),
            Role::Assistant => format!("AI: {}", turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while let Some(open) = rest.find('{') {
        for (slot, value) in values {
            if rest[open..].starts_with(slot) {
                output.push_str(&rest[..open]);
                output.push_str(value);
                rest = &rest[open + slot.len()..];
                continue 'scan;
            }
        }
        output.push_str(&rest[..=open]);
        rest = &rest[open + 1..];
    }
    output.push_str(rest);
    output
}
