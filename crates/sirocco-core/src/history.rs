//! Append-only transcript with whole-segment replacement.
//!
//! Mutation happens two ways only: `push` at the end, or `replace` of
//! the entire content. Nothing edits a message in place, so a compaction
//! candidate can be priced and then dropped without touching the log.

use sirocco_llm::Message;

use crate::meter::TokenMeter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    messages: Vec<Message>,
}

impl HistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn total_tokens(&self, meter: &impl TokenMeter) -> usize {
        self.messages.iter().map(|m| meter.count(&m.content)).sum()
    }

    /// Split into (head, protected tail of at most `keep_last` messages).
    #[must_use]
    pub fn split_tail(&self, keep_last: usize) -> (&[Message], &[Message]) {
        if keep_last >= self.messages.len() {
            return (&[], &self.messages);
        }
        self.messages.split_at(self.messages.len() - keep_last)
    }
}
