//! Conversation history.

use crate::model::Turn;

/// The ordered turn history of one conversation.
///
/// Append-only; `reset` is the only other mutation.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Read-only view of the history, oldest first.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Forget everything; the next turn starts a fresh conversation.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut state = ConversationState::new();
        state.append(Turn::user("first"));
        state.append(Turn::assistant(vec![]));
        state.append(Turn::user("second"));

        let turns = state.snapshot();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text(), "first");
        assert_eq!(turns[2].text(), "second");
    }

    #[test]
    fn reset_clears_history() {
        let mut state = ConversationState::new();
        state.append(Turn::user("hello"));
        state.reset();
        assert!(state.snapshot().is_empty());
        assert!(state.is_empty());
    }
}
