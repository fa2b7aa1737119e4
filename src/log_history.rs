// src/log_history.rs
//
// Bounded console history for a log view.
// Capped by characters and by lines; the oldest entries go first.

use std::collections::VecDeque;

/// Default character cap
pub const DEFAULT_LOG_CAPACITY_CHARS: usize = 3000;

/// Default line cap
pub const DEFAULT_LOG_CAPACITY_LINES: usize = 500;

#[derive(Debug, Clone)]
pub struct LogHistory {
    lines: VecDeque<String>,
    chars: usize,
    max_chars: usize,
    max_lines: usize,
}

impl LogHistory {
    pub fn new(max_chars: usize, max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            chars: 0,
            max_chars: max_chars.max(1),
            max_lines: max_lines.max(1),
        }
    }

    /// Append one entry and evict from the front until both caps hold.
    /// An entry longer than the character cap keeps only its tail.
    pub fn push(&mut self, text: &str) {
        let len = text.chars().count();
        let entry = if len > self.max_chars {
            text.chars().skip(len - self.max_chars).collect::<String>()
        } else {
            text.to_string()
        };

        self.chars += entry.chars().count();
        self.lines.push_back(entry);

        while self.chars > self.max_chars || self.lines.len() > self.max_lines {
            match self.lines.pop_front() {
                Some(old) => self.chars -= old.chars().count(),
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.chars = 0;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total characters retained
    pub fn char_count(&self) -> usize {
        self.chars
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|s| s.as_str())
    }

    /// Retained entries joined with newlines, oldest first
    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }
}

impl Default for LogHistory {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY_CHARS, DEFAULT_LOG_CAPACITY_LINES)
    }
}
