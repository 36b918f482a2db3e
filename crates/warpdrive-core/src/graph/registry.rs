// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Arena of graphs keyed by an opaque owner handle.
use rustc_hash::FxHashMap;

use super::Graph;

/// Opaque handle naming the owner of one graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerHandle(u64);

impl OwnerHandle {
    /// Raw handle value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Owns one [`Graph`] per registered owner. Destruction is explicit.
#[derive(Debug, Default)]
pub struct GraphRegistry {
    graphs: FxHashMap<OwnerHandle, Graph>,
    next: u64,
}

impl GraphRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `graph`; handles are never reused.
    pub fn register(&mut self, graph: Graph) -> OwnerHandle {
        let handle = OwnerHandle(self.next);
        self.next += 1;
        self.graphs.insert(handle, graph);
        handle
    }

    /// Graph owned by `handle`.
    pub fn get(&self, handle: OwnerHandle) -> Option<&Graph> {
        self.graphs.get(&handle)
    }

    /// Mutable graph owned by `handle`.
    pub fn get_mut(&mut self, handle: OwnerHandle) -> Option<&mut Graph> {
        self.graphs.get_mut(&handle)
    }

    /// Destroys and drops the graph owned by `handle`. Returns `false` if
    /// the handle was unknown.
    pub fn destroy(&mut self, handle: OwnerHandle) -> bool {
        match self.graphs.remove(&handle) {
            Some(mut graph) => {
                graph.destroy();
                true
            }
            None => false,
        }
    }

    /// Number of live graphs.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Returns `true` if no graph is registered.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::config::GraphConfig;
    use crate::notify::NullNotifier;
    use crate::scheduler::ManualScheduler;
    use crate::schema::SchemaRegistry;

    fn graph() -> Graph {
        Graph::new(
            Rc::new(SchemaRegistry::new()),
            GraphConfig::default(),
            Box::new(ManualScheduler::new()),
            Rc::new(NullNotifier),
        )
    }

    #[test]
    fn handles_are_unique_and_destroy_removes_entry() {
        let mut registry = GraphRegistry::new();
        let a = registry.register(graph());
        let b = registry.register(graph());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.destroy(a));
        assert!(registry.get(a).is_none());
        assert!(!registry.destroy(a));
        let c = registry.register(graph());
        assert_ne!(a, c, "handles are not reused");
        assert!(registry.get_mut(b).is_some_and(|g| !g.is_destroyed()));
    }
}
