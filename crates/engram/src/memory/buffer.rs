//! Short-term interaction buffer
//!
//! Holds user/assistant exchanges in insertion order until the manager
//! compacts them into long-term memory. Nothing here is persisted.

use crate::memory::types::Interaction;

/// Ordered in-memory log of interactions.
///
/// There is no size cap; the buffer is bounded only by the manager's
/// compaction threshold.
#[derive(Debug, Default, Clone)]
pub struct ShortTermBuffer {
    interactions: Vec<Interaction>,
}

impl ShortTermBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interaction at the end
    pub fn append(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    /// Render every interaction as `User: ..\nAssistant: ..`, oldest first,
    /// joined with newlines. Empty buffer renders as an empty string.
    pub fn render(&self) -> String {
        self.interactions
            .iter()
            .map(Interaction::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Length of `render()` in characters
    pub fn rendered_len(&self) -> usize {
        self.render().chars().count()
    }

    /// Drop every interaction
    pub fn clear(&mut self) {
        self.interactions.clear();
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Iterate over interactions, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.interactions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_new() {
        let buffer = ShortTermBuffer::new();
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.render(), "");
        assert_eq!(buffer.rendered_len(), 0);
    }

    #[test]
    fn test_buffer_append_and_len() {
        let mut buffer = ShortTermBuffer::new();

        buffer.append(Interaction::new("Hello", "Hi there"));
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_empty());

        buffer.append(Interaction::new("How are you?", "Fine"));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_render_format() {
        let mut buffer = ShortTermBuffer::new();
        buffer.append(Interaction::new("Hello", "Hi!"));
        buffer.append(Interaction::new("Bye", "See you"));

        assert_eq!(
            buffer.render(),
            "User: Hello\nAssistant: Hi!\nUser: Bye\nAssistant: See you"
        );
    }

    #[test]
    fn test_render_keeps_duplicates_in_order() {
        let mut buffer = ShortTermBuffer::new();
        buffer.append(Interaction::new("ping", "pong"));
        buffer.append(Interaction::new("ping", "pong"));

        assert_eq!(
            buffer.render(),
            "User: ping\nAssistant: pong\nUser: ping\nAssistant: pong"
        );
    }

    #[test]
    fn test_render_is_pure() {
        let mut buffer = ShortTermBuffer::new();
        buffer.append(Interaction::new("a", "b"));

        let first = buffer.render();
        let second = buffer.render();
        assert_eq!(first, second);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_rendered_len_counts_chars_not_bytes() {
        let mut buffer = ShortTermBuffer::new();
        buffer.append(Interaction::new("привет", "мир"));

        // "User: " + 6 + "\nAssistant: " + 3
        assert_eq!(buffer.rendered_len(), 6 + 6 + 12 + 3);
        assert!(buffer.render().len() > buffer.rendered_len());
    }

    #[test]
    fn test_buffer_clear() {
        let mut buffer = ShortTermBuffer::new();
        buffer.append(Interaction::new("Hello", "Hi"));
        buffer.append(Interaction::new("Again", "Hi again"));

        buffer.clear();
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.render(), "");
    }

    #[test]
    fn test_buffer_iter() {
        let mut buffer = ShortTermBuffer::new();
        buffer.append(Interaction::new("First", "1"));
        buffer.append(Interaction::new("Second", "2"));
        buffer.append(Interaction::new("Third", "3"));

        let users: Vec<_> = buffer.iter().map(|i| i.user.as_str()).collect();
        assert_eq!(users, vec!["First", "Second", "Third"]);
    }
}
