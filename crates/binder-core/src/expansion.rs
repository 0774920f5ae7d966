use crate::config::TEXT_BUFFER_CAPACITY;
use crate::keyboard::KeyInput;
use crate::models::Trigger;
use std::collections::VecDeque;

/// Rolling buffer of the most recently typed characters.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    chars: VecDeque<char>,
    capacity: usize,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::with_capacity(TEXT_BUFFER_CAPACITY)
    }
}

impl TextBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chars: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Apply one completed keystroke. Returns whether the buffer changed.
    pub fn apply(&mut self, input: KeyInput) -> bool {
        match input {
            KeyInput::Char(c) => self.push(c),
            KeyInput::Submit => self.push(' '),
            KeyInput::Backspace => return self.chars.pop_back().is_some(),
            KeyInput::Ignored => return false,
        }
        true
    }

    fn push(&mut self, c: char) {
        self.chars.push_back(c);
        while self.chars.len() > self.capacity {
            self.chars.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.chars.clear();
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contents(&self) -> String {
        self.chars.iter().collect()
    }

    /// Case-insensitive suffix test against `pattern`.
    pub fn ends_with_ignore_case(&self, pattern: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
        let tail: Vec<char> = self.chars.iter().flat_map(|c| c.to_lowercase()).collect();
        !pattern.is_empty() && tail.ends_with(&pattern)
    }
}

/// First trigger (in profile order) whose pattern ends the buffer.
///
/// Earlier triggers win ties, so when one pattern is a suffix of another the
/// one listed first fires. `triggers` is expected to hold only enabled text
/// triggers.
pub fn find_text_match<'a>(buffer: &TextBuffer, triggers: &'a [Trigger]) -> Option<&'a Trigger> {
    triggers
        .iter()
        .find(|t| buffer.ends_with_ignore_case(t.trimmed_pattern()))
}

/// Number of backspaces needed to erase a typed pattern.
pub fn erase_count(trigger: &Trigger) -> usize {
    trigger.trimmed_pattern().chars().count()
}
