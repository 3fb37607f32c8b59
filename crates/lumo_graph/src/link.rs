// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::node::NodeId;
use crate::slot::{Capability, SlotHandle};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed link from an output slot to an input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Source output slot
    pub from: SlotHandle,
    /// Destination input slot
    pub to: SlotHandle,
}

impl Link {
    /// Create a new link
    pub fn new(from: SlotHandle, to: SlotHandle) -> Self {
        Self { from, to }
    }

    /// Node producing the data
    pub fn from_node(&self) -> NodeId {
        self.from.node
    }

    /// Node consuming the data
    pub fn to_node(&self) -> NodeId {
        self.to.node
    }

    /// Capability carried by the link
    pub fn capability(&self) -> Capability {
        self.to.key.capability
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from.node == node_id || self.to.node == node_id
    }

    /// Check if this link involves a specific slot
    pub fn involves_slot(&self, slot: SlotHandle) -> bool {
        self.from == slot || self.to == slot
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
