// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and links.
//!
//! The graph is the only owner of its nodes. Links are stored keyed by their
//! destination input slot, so an input can never hold two links; adjacency
//! is derived from the link set on demand.

use crate::context::Context;
use crate::execution::Schedule;
use crate::link::Link;
use crate::node::{Node, NodeError, NodeId, NodeParams};
use crate::notification::{Delivery, Event};
use crate::slot::{Capability, SlotDirection, SlotHandle, SlotKey};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// A node graph
pub struct Graph {
    pub(crate) context: Arc<Context>,
    pub(crate) nodes: IndexMap<NodeId, Node>,
    pub(crate) links: IndexMap<SlotHandle, Link>,
    version: u64,
    pub(crate) schedule: Schedule,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            version: 0,
            schedule: Schedule::default(),
        }
    }

    /// Shared context
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Topology version, bumped on every node or link change
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Add a node of a registered type
    pub fn add_node(&mut self, type_key: &str) -> Result<NodeId, GraphError> {
        self.add_node_with(type_key, NodeParams::default())
    }

    /// Add a node with a name and position
    pub fn add_node_with(
        &mut self,
        type_key: &str,
        params: NodeParams,
    ) -> Result<NodeId, GraphError> {
        let id = self.context.allocate_id();
        self.insert_node(id, type_key, params)
    }

    /// Insert a node under an id already reserved in the context
    pub(crate) fn insert_node(
        &mut self,
        id: NodeId,
        type_key: &str,
        params: NodeParams,
    ) -> Result<NodeId, GraphError> {
        match Node::create(&self.context, id, type_key, params) {
            Ok(node) => {
                tracing::debug!("Added {type_key} node {id} ({})", node.name);
                self.nodes.insert(id, node);
                self.touch();
                Ok(id)
            }
            Err(e) => {
                self.context.release_id(id);
                tracing::warn!("Failed to add {type_key} node: {e}");
                Err(e)
            }
        }
    }

    /// Remove a node, breaking its links and releasing its resources.
    ///
    /// Returns false if the node does not exist.
    pub fn remove_node(&mut self, node_id: NodeId) -> bool {
        if !self.nodes.contains_key(&node_id) {
            return false;
        }

        let touching: Vec<Link> = self.links_for_node(node_id).copied().collect();
        for link in touching {
            self.remove_link(link);
        }

        if let Some(mut node) = self.nodes.shift_remove(&node_id) {
            node.teardown(&self.context);
        }
        self.context.release_id(node_id);
        self.touch();
        tracing::debug!("Removed node {node_id}");
        true
    }

    /// Remove every node, downstream nodes first
    pub fn clear(&mut self) {
        let mut order = self
            .execution_order()
            .unwrap_or_else(|_| self.node_ids().collect());
        order.reverse();
        for node_id in order {
            self.remove_node(node_id);
        }
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Whether the node exists
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find the first node with a display name
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.values().find(|n| n.name == name).map(Node::id)
    }

    /// Connect an output slot to an input slot.
    ///
    /// An existing link into the input is replaced. Nothing changes when the
    /// connection is rejected.
    pub fn connect(&mut self, from: SlotHandle, to: SlotHandle) -> Result<(), ConnectError> {
        let source_node = self
            .nodes
            .get(&from.node)
            .ok_or(ConnectError::NodeNotFound(from.node))?;
        let target_node = self
            .nodes
            .get(&to.node)
            .ok_or(ConnectError::NodeNotFound(to.node))?;

        if !source_node.slots().contains(&from.key) {
            return Err(ConnectError::SlotNotFound(from));
        }
        if !target_node.slots().contains(&to.key) {
            return Err(ConnectError::SlotNotFound(to));
        }

        if from.key.direction != SlotDirection::Output || to.key.direction != SlotDirection::Input {
            return Err(ConnectError::DirectionMismatch { from, to });
        }

        if from.key.capability != to.key.capability {
            return Err(ConnectError::IncompatibleSlots {
                output: from.key.capability,
                input: to.key.capability,
            });
        }

        if from.node == to.node {
            return Err(ConnectError::SelfLoop(from.node));
        }

        let existing = self.links.get(&to).copied();
        if existing.is_some_and(|link| link.from == from) {
            return Ok(());
        }

        if self.depends_on(from.node, to.node) {
            return Err(ConnectError::WouldCycle {
                from: from.node,
                to: to.node,
            });
        }

        if let Some(previous) = existing {
            tracing::debug!("Replacing link {previous}");
            self.remove_link(previous);
        }

        let link = Link::new(from, to);
        self.links.insert(to, link);
        self.touch();
        self.pull_input(to);
        tracing::debug!("Connected {link}");

        self.dispatch(vec![Delivery {
            emitter: from,
            receiver: to,
            event: Event::LinkConnected,
        }]);
        Ok(())
    }

    /// Remove the link between two slots if present
    pub fn disconnect(&mut self, from: SlotHandle, to: SlotHandle) -> bool {
        match self.links.get(&to).copied() {
            Some(link) if link.from == from => {
                self.remove_link(link);
                true
            }
            _ => false,
        }
    }

    /// Remove every link touching a slot, returning how many were removed
    pub fn break_all_links(&mut self, slot: SlotHandle) -> usize {
        let touching: Vec<Link> = self
            .links
            .values()
            .filter(|l| l.involves_slot(slot))
            .copied()
            .collect();
        for link in &touching {
            self.remove_link(*link);
        }
        touching.len()
    }

    fn remove_link(&mut self, link: Link) {
        if self.links.shift_remove(&link.to).is_none() {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&link.to.node) {
            node.slots_mut().assign(link.to.key, None);
        }
        self.touch();
        tracing::debug!("Disconnected {link}");

        self.dispatch(vec![Delivery {
            emitter: link.from,
            receiver: link.to,
            event: Event::LinkDisconnected,
        }]);
    }

    /// Get all links
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Link feeding an input slot
    pub fn link_into(&self, input: SlotHandle) -> Option<&Link> {
        self.links.get(&input)
    }

    /// Links leaving an output slot
    pub fn links_from(&self, output: SlotHandle) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.from == output)
    }

    /// Links involving a node
    pub fn links_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.involves_node(node_id))
    }

    /// Nodes feeding this node, without duplicates
    pub fn upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        for link in self.links.values().filter(|l| l.to.node == node_id) {
            if !found.contains(&link.from.node) {
                found.push(link.from.node);
            }
        }
        found
    }

    /// Nodes fed by this node, without duplicates
    pub fn downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        for link in self.links.values().filter(|l| l.from.node == node_id) {
            if !found.contains(&link.to.node) {
                found.push(link.to.node);
            }
        }
        found
    }

    /// Whether `node` transitively consumes data produced by `upstream`
    pub fn depends_on(&self, node: NodeId, upstream: NodeId) -> bool {
        node == upstream || self.reachable_from(upstream, |_| true).contains(&node)
    }

    /// Nodes reachable from `start` along links accepted by `follow`, including `start`
    pub(crate) fn reachable_from(
        &self,
        start: NodeId,
        follow: impl Fn(&Link) -> bool,
    ) -> HashSet<NodeId> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for link in self.links.values() {
                if link.from.node == current && follow(link) && seen.insert(link.to.node) {
                    queue.push_back(link.to.node);
                }
            }
        }
        seen
    }

    /// Get nodes in dependency order: every node after all of its producers.
    ///
    /// Independent nodes keep their insertion order.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let count = self.nodes.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for link in self.links.values() {
            let (Some(from), Some(to)) = (
                self.nodes.get_index_of(&link.from.node),
                self.nodes.get_index_of(&link.to.node),
            ) else {
                continue;
            };
            dependents[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        if order.len() < count {
            let nodes = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &degree)| degree > 0)
                .map(|(index, _)| ids[index])
                .collect();
            return Err(CycleError { nodes });
        }

        Ok(order.into_iter().map(|index| ids[index]).collect())
    }

    /// Copy the upstream output binding into an input slot, or clear it when unlinked
    pub(crate) fn pull_input(&mut self, input: SlotHandle) -> Option<()> {
        let value = self.links.get(&input).and_then(|link| {
            self.nodes
                .get(&link.from.node)?
                .slots()
                .value(&link.from.key)
                .cloned()
        });
        let node = self.nodes.get_mut(&input.node)?;
        node.slots_mut().assign(input.key, value).then_some(())
    }

    /// Refresh every input of a node from its upstream outputs
    pub(crate) fn refresh_inputs(&mut self, node_id: NodeId, trace: bool) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };
        let inputs: Vec<SlotKey> = node.slots().inputs().map(|s| s.key()).collect();
        for key in inputs {
            let handle = SlotHandle::new(node_id, key);
            self.pull_input(handle);
            if trace {
                let value = self.nodes.get(&node_id).and_then(|n| n.slots().value(&key));
                tracing::trace!("{handle} <- {value:?}");
            }
        }
    }

    /// Check that every link resolves to live, compatible slots
    pub fn verify(&self) -> Result<(), GraphError> {
        for (key, link) in &self.links {
            if *key != link.to {
                return Err(GraphError::Integrity(format!("{link} stored under {key}")));
            }
            for (end, direction) in [
                (link.from, SlotDirection::Output),
                (link.to, SlotDirection::Input),
            ] {
                let node = self.nodes.get(&end.node).ok_or_else(|| {
                    GraphError::Integrity(format!("{link} references missing node {}", end.node))
                })?;
                if !node.is_alive() || !node.slots().contains(&end.key) {
                    return Err(GraphError::Integrity(format!(
                        "{link} references missing slot {end}"
                    )));
                }
                if end.key.direction != direction {
                    return Err(GraphError::Integrity(format!(
                        "{link} has a misdirected end {end}"
                    )));
                }
            }
            if link.from.key.capability != link.to.key.capability {
                return Err(GraphError::Integrity(format!("{link} joins different capabilities")));
            }
        }
        Ok(())
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes)
            .field("links", &self.links.values().collect::<Vec<_>>())
            .field("version", &self.version)
            .finish()
    }
}

/// Error building or querying a graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No factory is registered under the key
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The factory declined to build the type
    #[error("Factory could not construct node type: {0}")]
    FactoryFailed(String),

    /// The node's initialization failed
    #[error("Failed to initialize {type_key} node: {source}")]
    InitFailed {
        /// Type of the failed node
        type_key: String,
        /// Underlying failure
        #[source]
        source: NodeError,
    },

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Graph contains a cycle
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// An internal invariant does not hold
    #[error("Graph integrity violated: {0}")]
    Integrity(String),
}

/// Error when creating a link
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Slot not found
    #[error("Slot not found: {0}")]
    SlotNotFound(SlotHandle),

    /// Source must be an output and destination an input
    #[error("Cannot link {from} to {to}: links run from an output to an input")]
    DirectionMismatch {
        /// Requested source
        from: SlotHandle,
        /// Requested destination
        to: SlotHandle,
    },

    /// Capabilities differ
    #[error("Incompatible slots: {} output cannot feed {} input", .output.label(), .input.label())]
    IncompatibleSlots {
        /// Capability of the output
        output: Capability,
        /// Capability of the input
        input: Capability,
    },

    /// Self-loop not allowed
    #[error("Self-loop not allowed on node {0}")]
    SelfLoop(NodeId),

    /// The link would close a cycle
    #[error("Linking {from} to {to} would create a cycle")]
    WouldCycle {
        /// Requested source node
        from: NodeId,
        /// Requested destination node
        to: NodeId,
    },
}

/// Error when graph contains a cycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Graph contains a cycle through {} node(s)", .nodes.len())]
pub struct CycleError {
    /// Nodes that could not be ordered
    pub nodes: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Capability::{Texture2D, Variable};
    use crate::testing::{fixture, ProbeEntry};

    fn tex_out(node: NodeId, binding: u32) -> SlotHandle {
        SlotHandle::output(node, Texture2D, binding)
    }

    fn tex_in(node: NodeId, binding: u32) -> SlotHandle {
        SlotHandle::input(node, Texture2D, binding)
    }

    #[test]
    fn test_add_node_assigns_unique_ids() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        assert_ne!(a, b);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.node(a).unwrap().name, "Probe");
        assert_eq!(graph.node(a).unwrap().type_key(), "probe");
    }

    #[test]
    fn test_add_node_failures_store_nothing() {
        let (backend, _, mut graph) = fixture();
        assert!(matches!(
            graph.add_node("missing"),
            Err(GraphError::UnknownNodeType(_))
        ));
        assert!(matches!(
            graph.add_node("refused"),
            Err(GraphError::FactoryFailed(_))
        ));
        assert!(matches!(
            graph.add_node("failing_init"),
            Err(GraphError::InitFailed { .. })
        ));
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.context().live_node_count(), 0);
        // The failed init allocated before failing and was torn down
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_connect_and_disconnect() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();

        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.upstream(b), vec![a]);
        assert_eq!(graph.downstream(a), vec![b]);

        assert!(!graph.disconnect(tex_out(a, 1), tex_in(b, 0)));
        assert!(graph.disconnect(tex_out(a, 0), tex_in(b, 0)));
        assert!(!graph.disconnect(tex_out(a, 0), tex_in(b, 0)));
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn test_failed_connect_leaves_graph_unchanged() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();
        let version = graph.version();

        let attempts = [
            (tex_out(a, 0), SlotHandle::input(b, Variable, 0)),
            (SlotHandle::output(a, Variable, 0), tex_in(b, 1)),
            (tex_in(b, 0), tex_out(a, 0)),
            (tex_out(a, 0), tex_in(a, 0)),
            (tex_out(a, 0), tex_in(b, 9)),
            (tex_out(NodeId(999), 0), tex_in(b, 1)),
        ];
        for (from, to) in attempts {
            assert!(graph.connect(from, to).is_err(), "{from} -> {to} should fail");
        }

        assert_eq!(
            graph.connect(tex_out(a, 0), tex_in(a, 0)),
            Err(ConnectError::SelfLoop(a))
        );
        assert_eq!(
            graph.connect(tex_in(b, 0), tex_out(a, 0)),
            Err(ConnectError::DirectionMismatch {
                from: tex_in(b, 0),
                to: tex_out(a, 0),
            })
        );
        assert_eq!(graph.version(), version);
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.link_into(tex_in(b, 0)).unwrap().from, tex_out(a, 0));
    }

    #[test]
    fn test_capability_mismatch_reported() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        assert_eq!(
            graph.connect(SlotHandle::output(a, Variable, 0), tex_in(b, 0)),
            Err(ConnectError::IncompatibleSlots {
                output: Variable,
                input: Texture2D,
            })
        );
    }

    #[test]
    fn test_reconnect_replaces_existing_link() {
        let (_, log, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        let c = graph.add_node("probe").unwrap();

        graph.connect(tex_out(a, 0), tex_in(c, 0)).unwrap();
        graph.connect(tex_out(b, 0), tex_in(c, 0)).unwrap();

        let into_c: Vec<_> = graph.links().filter(|l| l.to == tex_in(c, 0)).collect();
        assert_eq!(into_c.len(), 1);
        assert_eq!(into_c[0].from, tex_out(b, 0));
        assert!(graph.downstream(a).is_empty());

        // The receiver heard about the old link going away, then the new one
        let kinds = log.notifications_for(c);
        assert_eq!(
            kinds,
            vec![
                Event::LinkConnected.kind(),
                Event::LinkDisconnected.kind(),
                Event::LinkConnected.kind()
            ]
        );
    }

    #[test]
    fn test_reconnecting_same_link_is_noop() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();
        let version = graph.version();
        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();
        assert_eq!(graph.version(), version);
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn test_cycle_rejected_at_connect() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        let c = graph.add_node("probe").unwrap();
        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();
        graph.connect(tex_out(b, 0), tex_in(c, 0)).unwrap();

        assert_eq!(
            graph.connect(tex_out(c, 0), tex_in(a, 0)),
            Err(ConnectError::WouldCycle { from: c, to: a })
        );
        assert_eq!(graph.link_count(), 2);
        assert!(graph.execution_order().is_ok());
    }

    #[test]
    fn test_cycle_reported_by_execution_order() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();

        // Bypass the connect-time check to build a cycle directly
        let back = Link::new(tex_out(b, 0), tex_in(a, 0));
        graph.links.insert(back.to, back);

        let err = graph.execution_order().unwrap_err();
        assert_eq!(err.nodes, vec![a, b]);
    }

    #[test]
    fn test_execution_order_respects_dependencies() {
        let (_, _, mut graph) = fixture();
        // Inserted out of dependency order on purpose
        let output = graph.add_node("probe").unwrap();
        let filter = graph.add_node("probe").unwrap();
        let source = graph.add_node("probe").unwrap();
        let side = graph.add_node("probe").unwrap();

        graph.connect(tex_out(source, 0), tex_in(filter, 0)).unwrap();
        graph.connect(tex_out(filter, 0), tex_in(output, 0)).unwrap();
        graph.connect(tex_out(source, 1), tex_in(output, 1)).unwrap();

        let order = graph.execution_order().unwrap();
        let position = |id| order.iter().position(|&n| n == id).unwrap();
        for link in graph.links() {
            assert!(position(link.from.node) < position(link.to.node), "{link}");
        }

        // Determinism
        assert_eq!(graph.execution_order().unwrap(), order);
        assert_eq!(order, vec![source, filter, output, side]);
    }

    #[test]
    fn test_remove_node_breaks_all_links() {
        let (backend, log, mut graph) = fixture();
        let in_a = graph.add_node("probe").unwrap();
        let in_b = graph.add_node("probe").unwrap();
        let hub = graph.add_node("probe").unwrap();
        let outs: Vec<NodeId> = (0..3).map(|_| graph.add_node("probe").unwrap()).collect();
        let unrelated_a = graph.add_node("probe").unwrap();
        let unrelated_b = graph.add_node("probe").unwrap();

        graph.connect(tex_out(in_a, 0), tex_in(hub, 0)).unwrap();
        graph.connect(tex_out(in_b, 0), tex_in(hub, 1)).unwrap();
        for &out in &outs {
            graph.connect(tex_out(hub, 0), tex_in(out, 0)).unwrap();
        }
        graph.connect(tex_out(unrelated_a, 0), tex_in(unrelated_b, 0)).unwrap();
        graph.resize_all(crate::Extent::new(64, 64), 1).unwrap();
        let live_before = backend.live_count();

        assert_eq!(graph.link_count(), 6);
        assert!(graph.remove_node(hub));
        assert_eq!(graph.link_count(), 1);
        assert!(graph.links_for_node(hub).next().is_none());
        assert!(graph.node(hub).is_none());
        assert!(graph.verify().is_ok());
        assert!(graph.nodes().all(|n| !graph.upstream(n.id()).contains(&hub)));

        // Teardown released the hub's texture
        assert_eq!(backend.live_count(), live_before - 1);
        assert!(log.entries().contains(&ProbeEntry::Unit(hub)));

        // Consumers no longer hold the hub's view
        for &out in &outs {
            assert_eq!(graph.node(out).unwrap().slots().input_view(Texture2D, 0), None);
        }

        // Removing again is a no-op
        assert!(!graph.remove_node(hub));
    }

    #[test]
    fn test_break_all_links_connected_to_slot() {
        let (_, _, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        let c = graph.add_node("probe").unwrap();
        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();
        graph.connect(tex_out(a, 0), tex_in(c, 0)).unwrap();
        graph.connect(tex_out(a, 1), tex_in(c, 1)).unwrap();

        assert_eq!(graph.break_all_links(tex_out(a, 0)), 2);
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.break_all_links(tex_out(a, 0)), 0);
        assert_eq!(graph.break_all_links(tex_in(c, 1)), 1);
        assert_eq!(graph.link_count(), 0);
    }

    #[test]
    fn test_random_edit_sequences_keep_graph_consistent() {
        let (backend, _, mut graph) = fixture();
        let mut live: Vec<NodeId> = Vec::new();
        // Small deterministic LCG so the sequence is reproducible
        let mut seed: u64 = 0x5eed;
        let mut next = move |bound: usize| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) as usize) % bound.max(1)
        };

        for step in 0..400 {
            match next(4) {
                0 => live.push(graph.add_node("probe").unwrap()),
                1 if !live.is_empty() => {
                    let victim = live.remove(next(live.len()));
                    assert!(graph.remove_node(victim));
                }
                2 if live.len() >= 2 => {
                    let from = live[next(live.len())];
                    let to = live[next(live.len())];
                    let _ =
                        graph.connect(tex_out(from, next(3) as u32), tex_in(to, next(2) as u32));
                }
                3 if !live.is_empty() => {
                    let from = live[next(live.len())];
                    let to = live[next(live.len())];
                    graph.disconnect(tex_out(from, 0), tex_in(to, next(2) as u32));
                }
                _ => {}
            }

            assert!(graph.verify().is_ok(), "inconsistent after step {step}");
            assert!(graph.execution_order().is_ok(), "cycle after step {step}");
            for link in graph.links() {
                assert!(live.contains(&link.from.node) && live.contains(&link.to.node));
            }
        }

        graph.clear();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.context().live_node_count(), 0);
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_drop_tears_down_nodes() {
        let (backend, log, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        graph.connect(tex_out(a, 0), tex_in(b, 0)).unwrap();
        graph.resize_all(crate::Extent::new(16, 16), 2).unwrap();
        assert!(backend.live_count() > 0);

        drop(graph);
        assert_eq!(backend.live_count(), 0);
        let units: Vec<_> = log
            .entries()
            .into_iter()
            .filter(|e| matches!(e, ProbeEntry::Unit(_)))
            .collect();
        // Downstream first
        assert_eq!(units, vec![ProbeEntry::Unit(b), ProbeEntry::Unit(a)]);
    }
}
