//! Line-delimited JSON framing
//!
//! The CLI writes one top-level JSON object per line, but a single object may
//! arrive split across multiple reads, and one read may carry several objects
//! separated by embedded newlines. The accumulator below handles both: each
//! fragment is appended to a single buffer which is re-parsed after every
//! append; a successful parse resets the buffer and emits the value, a parse
//! failure keeps the buffer for the next fragment.
//!
//! The buffer has a hard size cap. Crossing it without a successful parse
//! fails the session; there is no way to resynchronize mid-object.

use serde_json::Value;

use crate::error::{ClaudeError, Result};
use crate::utils::truncate_for_display;

/// Accumulates JSON fragments until they parse as one value.
#[derive(Debug)]
pub(crate) struct JsonMessageAccumulator {
    buffer: String,
    max_buffer_size: usize,
}

impl JsonMessageAccumulator {
    pub(crate) fn new(max_buffer_size: usize) -> Self {
        Self {
            buffer: String::new(),
            max_buffer_size,
        }
    }

    /// Append one fragment (no embedded newlines) and try to parse.
    ///
    /// Returns `Ok(Some(value))` when the buffer now holds a complete JSON
    /// value, `Ok(None)` when more bytes are needed.
    pub(crate) fn push_fragment(&mut self, fragment: &str) -> Result<Option<Value>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(None);
        }

        self.buffer.push_str(fragment);

        if self.buffer.len() > self.max_buffer_size {
            let preview = truncate_for_display(&self.buffer, 100);
            self.buffer.clear();
            return Err(ClaudeError::buffer_overflow(self.max_buffer_size, preview));
        }

        match serde_json::from_str::<Value>(&self.buffer) {
            Ok(value) => {
                self.buffer.clear();
                Ok(Some(value))
            }
            // Partial object; keep accumulating
            Err(_) => Ok(None),
        }
    }

    /// Feed one line read from stdout.
    ///
    /// Splits on embedded newlines and runs each piece through
    /// [`push_fragment`](Self::push_fragment), returning every completed
    /// value in input order.
    pub(crate) fn feed_line(&mut self, line: &str) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        for fragment in line.split('\n') {
            if let Some(value) = self.push_fragment(fragment)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}
