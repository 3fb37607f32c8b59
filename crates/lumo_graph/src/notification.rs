// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notifications travelling along links.
//!
//! Notifications are separate from resource rewiring: they only tell
//! downstream nodes that something changed so they can flag state for the
//! next execution. Delivery is synchronous and breadth-first.

use crate::backend::Extent;
use crate::binding::VariableValue;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::slot::{SlotHandle, SlotKey};
use std::collections::VecDeque;

/// Kind of an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// New resource contents were produced
    ResourceUpdated,
    /// An output changed size
    Resized,
    /// A variable changed value
    VariableChanged,
    /// A link into the receiver was made
    LinkConnected,
    /// A link into the receiver was broken
    LinkDisconnected,
}

/// State-change event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// New resource contents were produced this frame
    ResourceUpdated,
    /// An output changed size
    Resized {
        /// New size
        size: Extent,
        /// Frames in flight
        buffer_count: u32,
    },
    /// A variable changed value
    VariableChanged(VariableValue),
    /// A link into the receiver was made
    LinkConnected,
    /// A link into the receiver was broken
    LinkDisconnected,
}

impl Event {
    /// The event's kind
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ResourceUpdated => EventKind::ResourceUpdated,
            Self::Resized { .. } => EventKind::Resized,
            Self::VariableChanged(_) => EventKind::VariableChanged,
            Self::LinkConnected => EventKind::LinkConnected,
            Self::LinkDisconnected => EventKind::LinkDisconnected,
        }
    }
}

/// An event as seen by one receiving input slot
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    /// The event
    pub event: &'a Event,
    /// Output slot that sent it
    pub emitter: SlotHandle,
    /// Input slot that received it
    pub receiver: SlotHandle,
}

impl Notification<'_> {
    /// Kind of the carried event
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Collects events a node sends from its own output slots
#[derive(Debug, Default)]
pub struct Emitter {
    pending: Vec<(SlotKey, Event)>,
}

impl Emitter {
    /// Create an empty emitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Send an event from one of the node's output slots
    pub fn emit(&mut self, output: SlotKey, event: Event) {
        self.pending.push((output, event));
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing was emitted
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn into_pending(self) -> Vec<(SlotKey, Event)> {
        self.pending
    }
}

/// One event on its way to one receiver
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub(crate) emitter: SlotHandle,
    pub(crate) receiver: SlotHandle,
    pub(crate) event: Event,
}

impl Graph {
    /// Send an event from an output slot to everything linked to it.
    ///
    /// Receivers may forward events further downstream. Returns the number of
    /// handler invocations; an invalid emitter delivers nothing.
    pub fn notify(&mut self, from: SlotHandle, event: Event) -> usize {
        let valid = from.key.is_output()
            && self
                .node(from.node)
                .is_some_and(|n| n.slots().contains(&from.key));
        if !valid {
            tracing::debug!("Ignoring {:?} from unknown output {from}", event.kind());
            return 0;
        }
        let deliveries = self.fan_out(from, &event);
        self.dispatch(deliveries)
    }

    /// Send events a node queued on its outputs
    pub(crate) fn emit_from(&mut self, node: NodeId, pending: Vec<(SlotKey, Event)>) -> usize {
        let mut deliveries = Vec::new();
        for (key, event) in pending {
            deliveries.extend(self.fan_out(SlotHandle::new(node, key), &event));
        }
        self.dispatch(deliveries)
    }

    fn fan_out(&self, from: SlotHandle, event: &Event) -> Vec<Delivery> {
        self.links_from(from)
            .map(|link| Delivery {
                emitter: from,
                receiver: link.to,
                event: event.clone(),
            })
            .collect()
    }

    /// Deliver events breadth-first, following re-emissions.
    ///
    /// Every emitted event reaches every linked receiver. On an acyclic graph
    /// a chain of forwards is shorter than the node count, so a delivery
    /// that travelled further went around a cycle and is dropped.
    pub(crate) fn dispatch(&mut self, initial: Vec<Delivery>) -> usize {
        let max_hops = self.nodes.len();
        let mut queue: VecDeque<(Delivery, usize)> =
            initial.into_iter().map(|delivery| (delivery, 1)).collect();
        let mut delivered = 0;

        while let Some((delivery, hops)) = queue.pop_front() {
            if hops > max_hops {
                tracing::warn!(
                    "Dropping {:?} on {} after {hops} hops; the graph has a cycle",
                    delivery.event.kind(),
                    delivery.receiver
                );
                continue;
            }

            let receiver = delivery.receiver.node;
            let Some(node) = self.nodes.get_mut(&receiver) else {
                continue;
            };
            let mut emitter = Emitter::new();
            node.notify(
                &Notification {
                    event: &delivery.event,
                    emitter: delivery.emitter,
                    receiver: delivery.receiver,
                },
                &mut emitter,
            );
            delivered += 1;

            let mut forwarded = Vec::new();
            for (key, event) in emitter.into_pending() {
                if key.is_output() && node.slots().contains(&key) {
                    forwarded.push((SlotHandle::new(receiver, key), event));
                } else {
                    tracing::warn!("Node {receiver} emitted on undeclared output {key}");
                }
            }
            for (from, event) in forwarded {
                queue.extend(
                    self.fan_out(from, &event)
                        .into_iter()
                        .map(|next| (next, hops + 1)),
                );
            }
        }

        delivered
    }
}
