// ABOUTME: Tool-call accumulation - a fixed-capacity table of in-flight calls
// ABOUTME: whose arguments grow by append or replace, and the committed list.

use tracing::debug;

use super::buffer::BoundedBuffer;
use crate::error::BufferOverflow;
use crate::llm::{ArgumentMode, ToolCall};

const INITIAL_ARGUMENT_CAPACITY: usize = 256;

/// A tool call whose id, name, and arguments are still arriving.
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    id: String,
    name: String,
    arguments: BoundedBuffer,
    identifier_cap: usize,
}

impl PendingToolCall {
    pub fn new(argument_cap: usize, identifier_cap: usize) -> Self {
        let initial = INITIAL_ARGUMENT_CAPACITY.min(argument_cap);
        Self {
            id: String::new(),
            name: String::new(),
            arguments: BoundedBuffer::new(initial, argument_cap),
            identifier_cap,
        }
    }

    pub fn set_id(&mut self, id: &str) {
        if !id.is_empty() {
            self.id = truncate_to_boundary(id, self.identifier_cap).to_string();
        }
    }

    pub fn set_name(&mut self, name: &str) {
        if !name.is_empty() {
            self.name = truncate_to_boundary(name, self.identifier_cap).to_string();
        }
    }

    /// Add an argument fragment according to `mode`.
    pub fn extend(&mut self, fragment: &str, mode: ArgumentMode) -> Result<(), BufferOverflow> {
        match mode {
            ArgumentMode::Append => self.arguments.append(fragment),
            ArgumentMode::Replace => self.arguments.replace(fragment),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &str {
        self.arguments.as_str()
    }

    pub fn finish(self) -> ToolCall {
        ToolCall {
            id: self.id,
            name: self.name,
            arguments: self.arguments.into_string(),
        }
    }
}

/// Fixed-capacity table of in-flight tool calls addressed by stream index.
///
/// Indices at or beyond the capacity are accepted and ignored.
#[derive(Debug, Clone)]
pub struct ToolCallTable {
    slots: Vec<Option<PendingToolCall>>,
    argument_cap: usize,
    identifier_cap: usize,
}

impl ToolCallTable {
    pub fn new(capacity: usize, argument_cap: usize, identifier_cap: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            argument_cap,
            identifier_cap,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_mut(&mut self, index: i64) -> Option<&mut PendingToolCall> {
        let index = usize::try_from(index).ok()?;
        let (argument_cap, identifier_cap) = (self.argument_cap, self.identifier_cap);
        let slot = self.slots.get_mut(index)?;
        Some(slot.get_or_insert_with(|| PendingToolCall::new(argument_cap, identifier_cap)))
    }

    /// Open the slot at `index` if needed and record whichever of id/name
    /// are present. Returns false when the index is out of range.
    pub fn begin(&mut self, index: i64, id: Option<&str>, name: Option<&str>) -> bool {
        let Some(slot) = self.slot_mut(index) else {
            debug!(index, "Ignoring tool call beyond table capacity");
            return false;
        };
        if let Some(id) = id {
            slot.set_id(id);
        }
        if let Some(name) = name {
            slot.set_name(name);
        }
        true
    }

    /// Add an argument fragment to the slot at `index`, opening it if needed.
    /// Returns `Ok(false)` when the index is out of range.
    pub fn extend_arguments(
        &mut self,
        index: i64,
        fragment: &str,
        mode: ArgumentMode,
    ) -> Result<bool, BufferOverflow> {
        match self.slot_mut(index) {
            Some(slot) => slot.extend(fragment, mode).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn get(&self, index: usize) -> Option<&PendingToolCall> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Close the slot at `index` and return its finished call.
    pub fn commit(&mut self, index: usize) -> Option<ToolCall> {
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .map(PendingToolCall::finish)
    }

    /// Close every open slot, in index order.
    pub fn commit_all(&mut self) -> Vec<ToolCall> {
        self.slots
            .iter_mut()
            .filter_map(Option::take)
            .map(PendingToolCall::finish)
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// The committed tool calls of a stream, bounded to a fixed count.
#[derive(Debug, Clone, Default)]
pub struct ToolCallList {
    calls: Vec<ToolCall>,
    capacity: usize,
}

impl ToolCallList {
    pub fn new(capacity: usize) -> Self {
        Self {
            calls: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a finished call. Returns false and drops it when the list is full.
    pub fn push(&mut self, call: ToolCall) -> bool {
        if self.calls.len() >= self.capacity {
            return false;
        }
        self.calls.push(call);
        true
    }

    pub fn as_slice(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn into_vec(self) -> Vec<ToolCall> {
        self.calls
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
pub(crate) fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
