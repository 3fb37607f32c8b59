// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resize cascades.
//!
//! Resizing a node visits it and every node downstream of it through sized
//! links (textures and buffers), in execution order and exactly once each.
//! Every visited node first re-pulls its inputs so it sees the reallocated
//! upstream resources, then reallocates its own and sends `Resized` from its
//! sized outputs.

use crate::backend::Extent;
use crate::binding::Binding;
use crate::graph::{Graph, GraphError};
use crate::node::NodeId;
use crate::notification::Event;
use crate::slot::SlotKey;

/// Outcome of a resize cascade
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResizeReport {
    /// Requested size
    pub size: Extent,
    /// Requested frames in flight
    pub buffer_count: u32,
    /// Nodes whose resize handler ran, in order
    pub visited: Vec<NodeId>,
    /// Nodes whose resize handler failed
    pub failed: Vec<NodeId>,
}

impl Graph {
    /// Resize a node and everything that derives its size from it
    pub fn resize(
        &mut self,
        node_id: NodeId,
        size: Extent,
        buffer_count: u32,
    ) -> Result<ResizeReport, GraphError> {
        if !self.contains(node_id) {
            return Err(GraphError::NodeNotFound(node_id));
        }

        let affected = self.reachable_from(node_id, |link| link.capability().is_sized());
        let targets: Vec<NodeId> = self
            .execution_order()?
            .into_iter()
            .filter(|id| affected.contains(id))
            .collect();

        tracing::debug!(
            "Resizing {node_id} to {size} ({buffer_count} buffers), {} node(s) affected",
            targets.len()
        );
        Ok(self.apply_resize(targets, size, buffer_count))
    }

    /// Resize every node, e.g. after the viewport changed
    pub fn resize_all(
        &mut self,
        size: Extent,
        buffer_count: u32,
    ) -> Result<ResizeReport, GraphError> {
        let targets = self.execution_order()?;
        Ok(self.apply_resize(targets, size, buffer_count))
    }

    fn apply_resize(
        &mut self,
        targets: Vec<NodeId>,
        size: Extent,
        buffer_count: u32,
    ) -> ResizeReport {
        let mut report = ResizeReport {
            size,
            buffer_count,
            ..ResizeReport::default()
        };
        let context = self.context.clone();

        for node_id in targets {
            self.refresh_inputs(node_id, false);
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            report.visited.push(node_id);
            if let Err(e) = node.resize(&context, size, buffer_count) {
                tracing::warn!("Resize of {node_id} to {size} failed: {e}");
                report.failed.push(node_id);
                continue;
            }

            let events: Vec<(SlotKey, Event)> = node
                .slots()
                .outputs()
                .filter(|slot| slot.capability().is_sized())
                .filter_map(|slot| {
                    let actual = match slot.value()? {
                        Binding::Texture { size, .. } => *size,
                        _ => size,
                    };
                    let event = Event::Resized {
                        size: actual,
                        buffer_count,
                    };
                    Some((slot.key(), event))
                })
                .collect();
            if !events.is_empty() {
                self.emit_from(node_id, events);
            }
        }

        report
    }
}
