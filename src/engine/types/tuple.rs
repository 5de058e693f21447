use super::FlowValue;

/// Process-unique, immutable record identity.
pub type TupleId = u64;

/// Monotonic tuple id allocator. Owned by whoever mints tuples — the host
/// graph for input records, the accumulator session for group rows.
#[derive(Debug, Clone, Default)]
pub struct TupleIds {
    next: TupleId,
}

impl TupleIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start issuing from a given id (used when a session inherits an allocator).
    pub fn starting_at(next: TupleId) -> Self {
        Self { next }
    }

    pub fn issue(&mut self) -> TupleId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// A record flowing through the graph: identity, current field map, and —
/// for modified records — the pre-pulse snapshot of the field map.
///
/// The transform only reads tuples it receives; `prev` is written by the
/// producer that edited the tuple (upstream nodes for inputs, the
/// accumulator for its own group rows).
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub id: TupleId,
    pub data: FlowValue,
    prev: Option<Box<FlowValue>>,
}

impl Tuple {
    pub fn new(id: TupleId, data: FlowValue) -> Self {
        Self {
            id,
            data,
            prev: None,
        }
    }

    pub fn with_prev(id: TupleId, data: FlowValue, prev: FlowValue) -> Self {
        Self {
            id,
            data,
            prev: Some(Box::new(prev)),
        }
    }

    /// The pre-pulse snapshot. Falls back to the current data when no edit
    /// has captured one, so removal paths always have a value to retract.
    pub fn previous(&self) -> &FlowValue {
        self.prev.as_deref().unwrap_or(&self.data)
    }

    pub fn has_prev(&self) -> bool {
        self.prev.is_some()
    }

    /// Capture the current data as the previous snapshot, then replace it.
    pub fn replace_data(&mut self, data: FlowValue) {
        self.prev = Some(Box::new(std::mem::replace(&mut self.data, data)));
    }

    pub fn clear_prev(&mut self) {
        self.prev = None;
    }

    /// Convenience field lookup on the current data.
    pub fn get(&self, key: &str) -> Option<&FlowValue> {
        self.data.get(key)
    }
}
