//! The ordered conversation log replayed to the provider on every request.

use serde::Serialize;

use crate::types::{Role, Turn};

/// Ordered sequence of turns.
///
/// Insertion order is chronological order and is the order sent to the
/// provider. At most one turn has [`Role::System`] and, when present, it sits at
/// index 0. Assistant turns are only ever appended complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    /// Creates a log holding only the system turn for `system_prompt`.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    /// Replaces the system turn, or inserts one, at index 0.
    ///
    /// Every non-system turn keeps its relative order. Applying the same prompt
    /// twice yields the same log as applying it once.
    pub fn apply_system_prompt(&mut self, prompt: impl Into<String>) {
        self.turns.retain(|turn| !turn.is_system());
        self.turns.insert(0, Turn::system(prompt));
    }

    /// Returns the active system prompt, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|turn| turn.is_system())
            .map(|turn| turn.content.as_str())
    }

    /// All turns, system turn first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The user and assistant turns, for display.
    pub fn conversation(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|turn| !turn.is_system())
    }

    /// Returns the most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns, including the system turn.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if the log holds no turns at all.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub(crate) fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::User, content));
    }

    pub(crate) fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::Assistant, content));
    }
}
