// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.
//!
//! A [`Node`] is the graph-owned shell around a [`NodeBehavior`]: identity,
//! layout metadata, the slot table and an optional child graph. Behaviors
//! only ever see their own slots through the context structs passed into
//! each entry point.

use crate::backend::{BackendError, CommandHandle, Extent};
use crate::context::Context;
use crate::execution::{DebugState, FrameContext};
use crate::graph::{Graph, GraphError};
use crate::notification::{Emitter, Notification};
use crate::slot::{SlotError, SlotKey, SlotTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Construction parameters for a new node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeParams {
    /// Display name; the type's display name when `None`
    pub name: Option<String>,
    /// Position in the editor
    pub position: [f32; 2],
}

impl NodeParams {
    /// Set the display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the position
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }
}

/// Error raised by a node behavior
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// A required input has no binding
    #[error("Missing input: {0}")]
    MissingInput(SlotKey),

    /// The node has not allocated its resources yet
    #[error("Resources not allocated: {0}")]
    NotReady(String),

    /// Device allocation failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Slot declaration failed
    #[error("Slot error: {0}")]
    Slot(#[from] SlotError),

    /// Persisted payload could not be read
    #[error("Invalid payload: {0}")]
    Payload(String),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}

/// Passed to [`NodeBehavior::init`]
pub struct NodeSetup<'a> {
    /// Id assigned to the node
    pub node: NodeId,
    /// Shared context
    pub context: &'a Context,
    /// Slot table to declare into
    pub slots: &'a mut SlotTable,
}

/// Passed to [`NodeBehavior::execute`] once per frame
pub struct ExecuteContext<'a, 'c> {
    /// Node being executed
    pub node: NodeId,
    /// Current frame
    pub frame_index: u64,
    /// Backend command recorder
    pub commands: &'a mut CommandHandle<'c>,
    /// Optional debug switches
    pub debug: Option<&'a DebugState>,
    /// Shared context
    pub context: &'a Context,
    /// The node's slots, inputs already refreshed from upstream
    pub slots: &'a mut SlotTable,
    /// Events to send downstream once the node finishes
    pub events: &'a mut Emitter,
}

/// Passed to [`NodeBehavior::on_resize`] during a resize cascade
pub struct ResizeContext<'a> {
    /// Node being resized
    pub node: NodeId,
    /// New size
    pub size: Extent,
    /// Number of frames in flight
    pub buffer_count: u32,
    /// Shared context
    pub context: &'a Context,
    /// The node's slots, inputs already refreshed from upstream
    pub slots: &'a mut SlotTable,
}

/// Behavior every node variant implements
pub trait NodeBehavior {
    /// Declare slots and allocate initial resources
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError>;

    /// Release every resource. May be called more than once.
    fn unit(&mut self, context: &Context);

    /// Record this frame's work
    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError>;

    /// Reallocate size-dependent resources
    fn on_resize(&mut self, _ctx: &mut ResizeContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// React to an event arriving on one of the node's inputs.
    ///
    /// Handlers only flag state for the next execution; they may forward
    /// events on their own outputs through `emitter`.
    fn on_notify(&mut self, _notification: &Notification<'_>, _emitter: &mut Emitter) {}

    /// Type-specific state to persist
    fn save_payload(&self) -> Option<String> {
        None
    }

    /// Restore state written by [`NodeBehavior::save_payload`]
    fn load_payload(&mut self, _payload: &str) -> Result<(), NodeError> {
        Ok(())
    }
}

/// A node instance in the graph
pub struct Node {
    id: NodeId,
    type_key: String,
    /// Display name
    pub name: String,
    /// Position in the editor
    pub position: [f32; 2],
    slots: SlotTable,
    subgraph: Option<Graph>,
    behavior: Box<dyn NodeBehavior>,
    alive: bool,
}

impl Node {
    /// Build and initialize a node through the registry
    pub(crate) fn create(
        context: &Arc<Context>,
        id: NodeId,
        type_key: &str,
        params: NodeParams,
    ) -> Result<Self, GraphError> {
        let registry = context.registry();
        let descriptor = registry
            .get(type_key)
            .ok_or_else(|| GraphError::UnknownNodeType(type_key.to_string()))?;
        let behavior = registry
            .construct(type_key, context)
            .ok_or_else(|| GraphError::FactoryFailed(type_key.to_string()))?;

        let mut node = Self {
            id,
            type_key: type_key.to_string(),
            name: params.name.unwrap_or_else(|| descriptor.name.clone()),
            position: params.position,
            slots: SlotTable::new(),
            subgraph: descriptor.composite.then(|| Graph::new(context.clone())),
            behavior,
            alive: true,
        };

        let result = node.behavior.init(&mut NodeSetup {
            node: id,
            context,
            slots: &mut node.slots,
        });
        if let Err(source) = result {
            node.teardown(context);
            return Err(GraphError::InitFailed {
                type_key: type_key.to_string(),
                source,
            });
        }

        Ok(node)
    }

    /// Unique id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Registry key of the node's type
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Declared slots and their current bindings
    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut SlotTable {
        &mut self.slots
    }

    /// Child graph of a composite node
    pub fn subgraph(&self) -> Option<&Graph> {
        self.subgraph.as_ref()
    }

    /// Mutable child graph of a composite node
    pub fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        self.subgraph.as_mut()
    }

    /// Whether the node holds a child graph
    pub fn is_composite(&self) -> bool {
        self.subgraph.is_some()
    }

    /// Whether the node has not been torn down
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Type-specific persisted state
    pub fn save_payload(&self) -> Option<String> {
        self.behavior.save_payload()
    }

    /// Restore type-specific persisted state
    pub fn load_payload(&mut self, payload: &str) -> Result<(), NodeError> {
        self.behavior.load_payload(payload)
    }

    pub(crate) fn execute(
        &mut self,
        context: &Context,
        frame: &mut FrameContext<'_>,
        events: &mut Emitter,
    ) -> Result<(), NodeError> {
        if !self.alive {
            return Err(NodeError::NotReady(format!("{} was torn down", self.id)));
        }
        self.behavior.execute(&mut ExecuteContext {
            node: self.id,
            frame_index: frame.frame_index,
            commands: &mut frame.commands,
            debug: frame.debug.as_ref(),
            context,
            slots: &mut self.slots,
            events,
        })
    }

    pub(crate) fn resize(
        &mut self,
        context: &Context,
        size: Extent,
        buffer_count: u32,
    ) -> Result<(), NodeError> {
        if !self.alive {
            return Ok(());
        }
        if let Some(subgraph) = &mut self.subgraph {
            if let Err(e) = subgraph.resize_all(size, buffer_count) {
                tracing::warn!("Resize of {} children failed: {e}", self.id);
            }
        }
        self.behavior.on_resize(&mut ResizeContext {
            node: self.id,
            size,
            buffer_count,
            context,
            slots: &mut self.slots,
        })
    }

    pub(crate) fn notify(&mut self, notification: &Notification<'_>, emitter: &mut Emitter) {
        if self.alive {
            self.behavior.on_notify(notification, emitter);
        }
    }

    /// Release the node's children and resources. Idempotent.
    pub(crate) fn teardown(&mut self, context: &Context) {
        if !self.alive {
            return;
        }
        if let Some(subgraph) = &mut self.subgraph {
            subgraph.clear();
        }
        self.behavior.unit(context);
        self.slots.clear_values();
        self.alive = false;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type_key", &self.type_key)
            .field("name", &self.name)
            .field("position", &self.position)
            .field("slots", &self.slots)
            .field("subgraph", &self.subgraph)
            .field("alive", &self.alive)
            .finish()
    }
}
