//! Signal plumbing: how the transform reads runtime signal values and how it
//! declares which signals must force a reset when they change. Scheduling is
//! the host graph's job; this module only carries the declaration.

use super::types::{FastMap, FlowValue};
use smol_str::SmolStr;

/// Read access to the graph's current signal values.
pub trait SignalResolver {
    fn signal(&self, name: &str) -> Option<&FlowValue>;
}

/// The transform's declared runtime dependency set. Any change to one of
/// these signals invalidates the compiled plan; the host must run the next
/// pulse with the reset flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    signals: Vec<SmolStr>,
}

impl Dependencies {
    pub fn from_names(mut names: Vec<SmolStr>) -> Self {
        names.sort_unstable();
        names.dedup();
        Self { signals: names }
    }

    pub fn signals(&self) -> &[SmolStr] {
        &self.signals
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Simple map-backed resolver for hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct SignalMap {
    values: FastMap<SmolStr, FlowValue>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<SmolStr>, value: impl Into<FlowValue>) {
        self.values.insert(name.into(), value.into());
    }
}

impl SignalResolver for SignalMap {
    fn signal(&self, name: &str) -> Option<&FlowValue> {
        self.values.get(name)
    }
}
