//! In-process peer directory: the contexts of every unit in one place.

use std::collections::BTreeMap;

use growth_traits::{Context, MemoryContext, PeerDirectory};

/// Unit contexts keyed by unit name.
///
/// A unit runs against the board with its own context taken out
/// (`take`/`put_back`), so it can read and write its peers' contexts while
/// holding its own mutably.
#[derive(Debug, Clone, Default)]
pub struct ContextBoard {
    contexts: BTreeMap<String, MemoryContext>,
}

impl ContextBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unit: impl Into<String>, ctx: MemoryContext) {
        self.contexts.insert(unit.into(), ctx);
    }

    /// Remove a unit's context; an unknown unit yields an empty one.
    pub fn take(&mut self, unit: &str) -> MemoryContext {
        self.contexts.remove(unit).unwrap_or_default()
    }

    pub fn put_back(&mut self, unit: &str, ctx: MemoryContext) {
        self.contexts.insert(unit.to_string(), ctx);
    }

    pub fn get(&self, unit: &str) -> Option<&MemoryContext> {
        self.contexts.get(unit)
    }

    pub fn units(&self) -> impl Iterator<Item = (&str, &MemoryContext)> {
        self.contexts.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PeerDirectory for ContextBoard {
    fn peer_context(&self, unit: &str) -> Option<&dyn Context> {
        self.contexts.get(unit).map(|c| c as &dyn Context)
    }

    fn peer_context_mut(&mut self, unit: &str) -> Option<&mut dyn Context> {
        self.contexts.get_mut(unit).map(|c| c as &mut dyn Context)
    }
}
