// ABOUTME: BoundedBuffer - a text accumulator with geometric growth and a hard
// ABOUTME: ceiling. Rejected appends leave existing content untouched.

use crate::error::BufferOverflow;

/// Text accumulator with a hard size ceiling.
///
/// Capacity doubles on demand and never exceeds the ceiling. An append that
/// would cross the ceiling is rejected whole, and the buffer is sealed: every
/// later append is rejected too, so the content stays a clean prefix of the
/// stream. [`replace`](Self::replace) carries a complete document and lifts
/// the seal when it fits.
#[derive(Debug, Clone)]
pub struct BoundedBuffer {
    text: String,
    limit: usize,
    sealed: bool,
    rejected_bytes: usize,
}

impl BoundedBuffer {
    /// Create an empty buffer with the given starting capacity and ceiling.
    pub fn new(initial_capacity: usize, limit: usize) -> Self {
        Self {
            text: String::with_capacity(initial_capacity.min(limit)),
            limit,
            sealed: false,
            rejected_bytes: 0,
        }
    }

    /// Append `fragment`, or reject it entirely.
    pub fn append(&mut self, fragment: &str) -> Result<(), BufferOverflow> {
        if fragment.is_empty() {
            return Ok(());
        }

        let needed = self.text.len().saturating_add(fragment.len());
        if self.sealed || needed > self.limit {
            self.sealed = true;
            self.rejected_bytes = self.rejected_bytes.saturating_add(fragment.len());
            return Err(BufferOverflow {
                attempted: needed,
                limit: self.limit,
            });
        }

        self.grow_to(needed);
        self.text.push_str(fragment);
        Ok(())
    }

    /// Overwrite the whole content with `document`, or reject it and keep the
    /// current content.
    pub fn replace(&mut self, document: &str) -> Result<(), BufferOverflow> {
        if document.len() > self.limit {
            self.rejected_bytes = self.rejected_bytes.saturating_add(document.len());
            return Err(BufferOverflow {
                attempted: document.len(),
                limit: self.limit,
            });
        }

        self.text.clear();
        self.grow_to(document.len());
        self.text.push_str(document);
        self.sealed = false;
        Ok(())
    }

    fn grow_to(&mut self, needed: usize) {
        let capacity = self.text.capacity();
        if needed <= capacity {
            return;
        }

        let mut new_capacity = capacity.max(1).saturating_mul(2);
        while new_capacity < needed {
            new_capacity = new_capacity.saturating_mul(2);
        }
        let new_capacity = new_capacity.min(self.limit);
        self.text.reserve_exact(new_capacity - self.text.len());
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.text.capacity()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// True once an append has been rejected.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Total bytes of fragments rejected so far.
    pub fn rejected_bytes(&self) -> usize {
        self.rejected_bytes
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
