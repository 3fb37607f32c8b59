// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared rendering-core context.
//!
//! Constructed once by the application and handed to every graph by `Arc`.
//! It carries the backend, the node registry and the node id allocator.

use crate::backend::{Backend, HeadlessBackend};
use crate::node::NodeId;
use crate::registry::NodeRegistry;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Default)]
struct IdAllocator {
    next: u64,
    live: HashSet<u64>,
}

/// Context shared by every graph and node of an application
pub struct Context {
    backend: Arc<dyn Backend>,
    registry: NodeRegistry,
    ids: Mutex<IdAllocator>,
}

impl Context {
    /// Create a context
    pub fn new(backend: Arc<dyn Backend>, registry: NodeRegistry) -> Arc<Self> {
        Arc::new(Self {
            backend,
            registry,
            ids: Mutex::new(IdAllocator::default()),
        })
    }

    /// Create a context over a fresh [`HeadlessBackend`]
    pub fn headless(registry: NodeRegistry) -> Arc<Self> {
        Self::new(Arc::new(HeadlessBackend::new()), registry)
    }

    /// Device backend
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Node registry
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Number of node ids currently in use
    pub fn live_node_count(&self) -> usize {
        self.ids.lock().live.len()
    }

    /// Hand out a fresh node id.
    ///
    /// Counting wraps past `u64::MAX` and never yields 0 or a live id.
    pub(crate) fn allocate_id(&self) -> NodeId {
        let mut ids = self.ids.lock();
        loop {
            ids.next = ids.next.wrapping_add(1);
            let candidate = ids.next;
            if candidate != 0 && ids.live.insert(candidate) {
                return NodeId(candidate);
            }
        }
    }

    /// Reserve a specific id, e.g. one read from a document.
    ///
    /// Returns `None` if the id is already in use.
    pub(crate) fn claim_id(&self, id: NodeId) -> Option<NodeId> {
        let mut ids = self.ids.lock();
        if id.0 == 0 || !ids.live.insert(id.0) {
            return None;
        }
        ids.next = ids.next.max(id.0);
        Some(id)
    }

    /// Return an id to the pool of unused ids
    pub(crate) fn release_id(&self, id: NodeId) {
        self.ids.lock().live.remove(&id.0);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.backend.name())
            .field("registry", &self.registry)
            .field("live_nodes", &self.live_node_count())
            .finish()
    }
}
