// src/framing.rs
//
// Line framing for the telemetry stream.
// Turns arbitrarily fragmented chunks into complete, trimmed lines.

/// Default cap on buffered bytes without a line terminator
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// Output of the line decoder
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// A complete line, terminator and surrounding whitespace removed
    Line(String),
    /// The buffer exceeded its cap without a terminator and was reset
    Overflow { discarded: usize },
}

/// Accumulates bytes and emits one `Line` per `\n`.
///
/// Works on bytes so multi-byte UTF-8 sequences split across chunks decode
/// intact. `\r\n` endings are handled by trimming. When more than `max_len`
/// bytes pile up without a terminator the buffer is dropped, a single
/// `Overflow` is reported, and the rest of that line is discarded up to the
/// next terminator.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    max_len: usize,
    /// Dropping the tail of an overflowed line
    discarding: bool,
}

impl LineDecoder {
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            buffer: Vec::with_capacity(max_len.min(1024)),
            max_len,
            discarding: false,
        }
    }

    /// Bytes currently buffered awaiting a terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, data: &[u8]) -> Vec<DecodedFrame> {
        let mut frames = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let newline = rest.iter().position(|&b| b == b'\n');
            let (segment, terminated) = match newline {
                Some(i) => (&rest[..i], true),
                None => (rest, false),
            };
            rest = match newline {
                Some(i) => &rest[i + 1..],
                None => &[],
            };

            if self.discarding {
                if terminated {
                    self.discarding = false;
                }
                continue;
            }

            if self.buffer.len() + segment.len() > self.max_len {
                let discarded = self.buffer.len() + segment.len();
                self.buffer.clear();
                frames.push(DecodedFrame::Overflow { discarded });
                self.discarding = !terminated;
                continue;
            }

            self.buffer.extend_from_slice(segment);
            if terminated {
                if let Some(line) = self.take_line() {
                    frames.push(DecodedFrame::Line(line));
                }
            }
        }

        frames
    }

    /// Drop any partial line. A line without a terminator is never delivered.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    fn take_line(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}
