// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation and execution.
//!
//! One call to [`Graph::execute_frame`] runs every node once in dependency
//! order. Before a node runs, each of its inputs is refreshed from the
//! upstream output it is linked to, so reallocations upstream are picked up
//! without any push notification. A failing node keeps its previous outputs
//! and the frame carries on.

use crate::backend::CommandHandle;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::notification::Emitter;
use std::collections::HashSet;

/// Debug switches for a frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugState {
    /// Log every binding pulled into an input at trace level
    pub trace_bindings: bool,
}

/// Per-frame inputs of the execution driver
#[derive(Debug)]
pub struct FrameContext<'c> {
    /// Current frame
    pub frame_index: u64,
    /// Backend command recorder
    pub commands: CommandHandle<'c>,
    /// Optional debug switches
    pub debug: Option<DebugState>,
}

impl<'c> FrameContext<'c> {
    /// Create a frame context
    pub fn new(frame_index: u64, commands: CommandHandle<'c>) -> Self {
        Self {
            frame_index,
            commands,
            debug: None,
        }
    }

    /// Create a frame context without a command recorder
    pub fn detached(frame_index: u64) -> Self {
        Self::new(frame_index, CommandHandle::detached())
    }

    /// Attach debug switches
    pub fn with_debug(mut self, debug: DebugState) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// What happened during one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Frame that ran
    pub frame_index: u64,
    /// Nodes that executed successfully, in order
    pub executed: Vec<NodeId>,
    /// Nodes whose execution failed; their outputs are stale
    pub failed: Vec<NodeId>,
    /// Whether the execution order was recomputed this frame
    pub order_recomputed: bool,
    /// Whether the last known-good order was used because of a cycle
    pub fallback: bool,
    /// Whether execution was skipped entirely
    pub skipped: bool,
}

impl FrameReport {
    /// Whether every node ran without failure
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.fallback && !self.skipped
    }
}

/// Cached execution order of a graph
#[derive(Debug, Clone, Default)]
pub(crate) struct Schedule {
    version: Option<u64>,
    order: Vec<NodeId>,
    last_good: Vec<NodeId>,
    degraded: bool,
}

impl Graph {
    /// Run one frame
    pub fn execute_frame(&mut self, frame: &mut FrameContext<'_>) -> FrameReport {
        let mut report = FrameReport {
            frame_index: frame.frame_index,
            ..FrameReport::default()
        };
        let mut executed = HashSet::new();
        self.run_frame(frame, &mut executed, &mut report);
        report
    }

    fn run_frame(
        &mut self,
        frame: &mut FrameContext<'_>,
        executed: &mut HashSet<NodeId>,
        report: &mut FrameReport,
    ) {
        let order = self.current_order(report);
        if order.is_empty() && self.node_count() > 0 {
            report.skipped = true;
            return;
        }

        let trace = frame.debug.as_ref().is_some_and(|d| d.trace_bindings);
        let context = self.context.clone();

        for node_id in order {
            if !executed.insert(node_id) {
                tracing::trace!("Node {node_id} already ran in frame {}", frame.frame_index);
                continue;
            }
            if !self.contains(node_id) {
                continue;
            }

            self.refresh_inputs(node_id, trace);

            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            if let Some(subgraph) = node.subgraph_mut() {
                subgraph.run_frame(frame, executed, report);
            }

            let mut events = Emitter::new();
            match node.execute(&context, frame, &mut events) {
                Ok(()) => {
                    report.executed.push(node_id);
                    let pending = events.into_pending();
                    if !pending.is_empty() {
                        self.emit_from(node_id, pending);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Node {node_id} failed in frame {}: {e}; keeping previous outputs",
                        frame.frame_index
                    );
                    report.failed.push(node_id);
                }
            }
        }
    }

    /// Order to run this frame, recomputed only when the topology changed
    fn current_order(&mut self, report: &mut FrameReport) -> Vec<NodeId> {
        if self.schedule.version == Some(self.version()) {
            report.fallback |= self.schedule.degraded;
            return self.schedule.order.clone();
        }

        let version = self.version();
        match self.execution_order() {
            Ok(order) => {
                report.order_recomputed = true;
                self.schedule.version = Some(version);
                self.schedule.order = order.clone();
                self.schedule.last_good = order.clone();
                self.schedule.degraded = false;
                order
            }
            Err(e) => {
                let fallback: Vec<NodeId> = self
                    .schedule
                    .last_good
                    .iter()
                    .copied()
                    .filter(|&id| self.contains(id))
                    .collect();
                if fallback.is_empty() {
                    tracing::error!("{e}; skipping execution");
                } else {
                    tracing::error!(
                        "{e}; using last known-good order of {} node(s)",
                        fallback.len()
                    );
                    report.fallback = true;
                }
                self.schedule.version = Some(version);
                self.schedule.order = fallback.clone();
                self.schedule.degraded = true;
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Extent, HeadlessCommands};
    use crate::link::Link;
    use crate::slot::Capability::{Texture2D, Variable};
    use crate::slot::SlotHandle;
    use crate::testing::{fixture, ProbeEntry};

    fn chain(graph: &mut Graph, len: usize) -> Vec<NodeId> {
        let nodes: Vec<_> = (0..len).map(|_| graph.add_node("probe").unwrap()).collect();
        for pair in nodes.windows(2) {
            graph
                .connect(
                    SlotHandle::output(pair[0], Texture2D, 0),
                    SlotHandle::input(pair[1], Texture2D, 0),
                )
                .unwrap();
        }
        nodes
    }

    #[test]
    fn test_frame_runs_in_dependency_order() {
        let (_, log, mut graph) = fixture();
        let nodes = chain(&mut graph, 3);
        graph.resize_all(Extent::new(32, 32), 2).unwrap();
        log.clear();

        let report = graph.execute_frame(&mut FrameContext::detached(0));
        assert!(report.is_clean());
        assert!(report.order_recomputed);
        assert_eq!(report.executed, nodes);
        assert_eq!(log.executed_nodes(), nodes);
    }

    #[test]
    fn test_order_cached_until_topology_changes() {
        let (_, _, mut graph) = fixture();
        let nodes = chain(&mut graph, 2);

        assert!(graph.execute_frame(&mut FrameContext::detached(0)).order_recomputed);
        assert!(!graph.execute_frame(&mut FrameContext::detached(1)).order_recomputed);

        graph.disconnect(
            SlotHandle::output(nodes[0], Texture2D, 0),
            SlotHandle::input(nodes[1], Texture2D, 0),
        );
        assert!(graph.execute_frame(&mut FrameContext::detached(2)).order_recomputed);
    }

    #[test]
    fn test_inputs_pulled_each_frame() {
        let (_, _, mut graph) = fixture();
        let nodes = chain(&mut graph, 2);
        graph.resize_all(Extent::new(8, 8), 2).unwrap();

        for frame in 0..4 {
            graph.execute_frame(&mut FrameContext::detached(frame));
            let produced = graph.node(nodes[0]).unwrap().slots().output_view(Texture2D, 0);
            let consumed = graph.node(nodes[1]).unwrap().slots().input_view(Texture2D, 0);
            assert!(produced.is_some());
            assert_eq!(produced, consumed, "frame {frame}");
        }
    }

    #[test]
    fn test_failed_node_keeps_stale_outputs_and_downstream_runs() {
        let (_, log, mut graph) = fixture();
        let nodes = chain(&mut graph, 3);
        graph.resize_all(Extent::new(16, 16), 2).unwrap();

        graph.execute_frame(&mut FrameContext::detached(0));
        let before = graph.node(nodes[1]).unwrap().slots().output_view(Texture2D, 0);
        assert!(before.is_some());

        log.fail(nodes[1]);
        log.clear();
        let report = graph.execute_frame(&mut FrameContext::detached(1));
        assert_eq!(report.failed, vec![nodes[1]]);
        assert_eq!(report.executed, vec![nodes[0], nodes[2]]);
        assert!(!report.is_clean());

        // Frame 1 would have switched images; the failed node still shows frame 0's
        let after = graph.node(nodes[1]).unwrap().slots().output_view(Texture2D, 0);
        assert_eq!(after, before);
        let seen_downstream = graph.node(nodes[2]).unwrap().slots().input_view(Texture2D, 0);
        assert_eq!(seen_downstream, before);
        assert!(log.executed_nodes().contains(&nodes[2]));
    }

    #[test]
    fn test_cycle_falls_back_to_last_good_order() {
        let (_, _, mut graph) = fixture();
        let nodes = chain(&mut graph, 2);
        assert!(graph.execute_frame(&mut FrameContext::detached(0)).is_clean());

        let back = Link::new(
            SlotHandle::output(nodes[1], Texture2D, 0),
            SlotHandle::input(nodes[0], Texture2D, 1),
        );
        graph.links.insert(back.to, back);
        // Force the cached order to be rebuilt
        graph.schedule.version = None;

        let report = graph.execute_frame(&mut FrameContext::detached(1));
        assert!(report.fallback);
        assert_eq!(report.executed, nodes);

        let report = graph.execute_frame(&mut FrameContext::detached(2));
        assert!(report.fallback);
        assert!(!report.order_recomputed);
    }

    #[test]
    fn test_cycle_without_known_good_order_skips_frame() {
        let (_, log, mut graph) = fixture();
        let nodes = chain(&mut graph, 2);
        let back = Link::new(
            SlotHandle::output(nodes[1], Texture2D, 0),
            SlotHandle::input(nodes[0], Texture2D, 0),
        );
        graph.links.insert(back.to, back);
        log.clear();

        let report = graph.execute_frame(&mut FrameContext::detached(0));
        assert!(report.skipped);
        assert!(report.executed.is_empty());
        assert!(log.executed_nodes().is_empty());
    }

    #[test]
    fn test_node_runs_once_per_frame() {
        let (_, log, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        let c = graph.add_node("probe").unwrap();
        // Diamond: a feeds b and c through two paths, b also feeds c
        graph
            .connect(SlotHandle::output(a, Texture2D, 0), SlotHandle::input(b, Texture2D, 0))
            .unwrap();
        graph
            .connect(SlotHandle::output(a, Texture2D, 1), SlotHandle::input(c, Texture2D, 0))
            .unwrap();
        graph
            .connect(SlotHandle::output(b, Texture2D, 0), SlotHandle::input(c, Texture2D, 1))
            .unwrap();
        log.clear();

        graph.execute_frame(&mut FrameContext::detached(0));
        assert_eq!(log.executed_nodes(), vec![a, b, c]);
    }

    #[test]
    fn test_emitted_events_delivered_within_frame() {
        let (_, log, mut graph) = fixture();
        let a = graph.add_node("probe").unwrap();
        let b = graph.add_node("probe").unwrap();
        graph
            .connect(SlotHandle::output(a, Variable, 0), SlotHandle::input(b, Variable, 0))
            .unwrap();
        log.clear();

        graph.execute_frame(&mut FrameContext::detached(5));
        let entries = log.entries();
        let a_ran = entries
            .iter()
            .position(|e| *e == ProbeEntry::Executed { node: a, frame: 5 })
            .unwrap();
        let b_heard = entries
            .iter()
            .position(|e| matches!(e, ProbeEntry::Notified { node, .. } if *node == b))
            .unwrap();
        let b_ran = entries
            .iter()
            .position(|e| *e == ProbeEntry::Executed { node: b, frame: 5 })
            .unwrap();
        assert!(a_ran < b_heard && b_heard < b_ran);
        assert_eq!(
            graph.node(b).unwrap().slots().input_variable(0),
            Some(&crate::VariableValue::Int(5))
        );
    }

    #[test]
    fn test_commands_reach_nodes() {
        let (_, _, mut graph) = fixture();
        let nodes = chain(&mut graph, 2);
        graph.resize_all(Extent::new(4, 4), 1).unwrap();

        let mut commands = HeadlessCommands::new();
        let mut frame = FrameContext::new(0, CommandHandle::new(&mut commands))
            .with_debug(DebugState { trace_bindings: true });
        graph.execute_frame(&mut frame);
        drop(frame);

        assert_eq!(
            commands.commands(),
            [format!("probe {}", nodes[0]), format!("probe {}", nodes[1])]
        );
    }

    #[test]
    fn test_composite_children_run_before_parent() {
        let (_, log, mut graph) = fixture();
        let group = graph.add_node("probe_group").unwrap();
        let child = graph
            .node_mut(group)
            .unwrap()
            .subgraph_mut()
            .unwrap()
            .add_node("probe")
            .unwrap();
        log.clear();

        let report = graph.execute_frame(&mut FrameContext::detached(0));
        assert_eq!(report.executed, vec![child, group]);
        assert_eq!(log.executed_nodes(), vec![child, group]);
    }
}
