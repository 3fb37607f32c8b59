// SPDX-License-Identifier: MIT OR Apache-2.0
//! Test fixtures: a registry of probe nodes that record what happens to them.

use crate::backend::{Extent, HeadlessBackend, HeadlessCommands, OwnedTexture, TextureFormat};
use crate::binding::VariableValue;
use crate::context::Context;
use crate::graph::Graph;
use crate::node::{ExecuteContext, NodeBehavior, NodeError, NodeId, NodeSetup, ResizeContext};
use crate::notification::{Emitter, Event, EventKind, Notification};
use crate::registry::{NodeCategory, NodeDescriptor, NodeRegistry};
use crate::slot::{Capability, SlotHandle, SlotKey};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Something a probe observed
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProbeEntry {
    Executed {
        node: NodeId,
        frame: u64,
    },
    Notified {
        node: NodeId,
        kind: EventKind,
        receiver: SlotHandle,
    },
    Resized {
        node: NodeId,
        size: Extent,
    },
    Unit(NodeId),
}

/// Shared journal of every probe in a fixture
#[derive(Debug, Default)]
pub(crate) struct ProbeLog {
    entries: Mutex<Vec<ProbeEntry>>,
    failing: Mutex<HashSet<NodeId>>,
}

impl ProbeLog {
    fn push(&self, entry: ProbeEntry) {
        self.entries.lock().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<ProbeEntry> {
        self.entries.lock().clone()
    }

    /// Forget recorded entries; failing nodes stay failing
    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Make a node's execution fail from now on
    pub(crate) fn fail(&self, node: NodeId) {
        self.failing.lock().insert(node);
    }

    fn should_fail(&self, node: NodeId) -> bool {
        self.failing.lock().contains(&node)
    }

    pub(crate) fn executed_nodes(&self) -> Vec<NodeId> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                ProbeEntry::Executed { node, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn notified_nodes(&self) -> Vec<NodeId> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                ProbeEntry::Notified { node, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn notifications_for(&self, target: NodeId) -> Vec<EventKind> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                ProbeEntry::Notified { node, kind, .. } if *node == target => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn resized_nodes(&self) -> Vec<(NodeId, Extent)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                ProbeEntry::Resized { node, size } => Some((*node, *size)),
                _ => None,
            })
            .collect()
    }
}

/// Node with every common slot shape that journals its callbacks.
///
/// Output texture 0 follows the size of input texture 0 when linked, the
/// requested size otherwise.
struct Probe {
    log: Arc<ProbeLog>,
    node: NodeId,
    target: OwnedTexture,
}

impl Probe {
    fn new(log: Arc<ProbeLog>) -> Self {
        Self {
            log,
            node: NodeId(0),
            target: OwnedTexture::new("probe", TextureFormat::Rgba8),
        }
    }
}

impl NodeBehavior for Probe {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        self.node = setup.node;
        setup.slots.declare_input("A", Capability::Texture2D, 0)?;
        setup.slots.declare_input("B", Capability::Texture2D, 1)?;
        setup.slots.declare_input("Value", Capability::Variable, 0)?;
        setup.slots.declare_input("Scale", Capability::Variable, 1)?;
        setup.slots.declare_output("Color", Capability::Texture2D, 0)?;
        setup.slots.declare_output("Depth", Capability::Texture2D, 1)?;
        setup.slots.declare_output("Mask", Capability::Texture2D, 2)?;
        setup.slots.declare_output("Frame", Capability::Variable, 0)?;
        Ok(())
    }

    fn unit(&mut self, context: &Context) {
        self.target.release(context.backend());
        self.log.push(ProbeEntry::Unit(self.node));
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        if self.log.should_fail(ctx.node) {
            return Err(NodeError::Custom(format!("{} told to fail", ctx.node)));
        }

        if let Some(view) = self.target.view(ctx.frame_index) {
            ctx.slots.publish_view(Capability::Texture2D, 0, view, self.target.size());
        }
        let frame = VariableValue::Int(ctx.frame_index as i32);
        ctx.slots.publish_variable(0, frame.clone());
        ctx.events.emit(
            SlotKey::output(Capability::Variable, 0),
            Event::VariableChanged(frame),
        );
        if let Some(commands) = ctx.commands.downcast_mut::<HeadlessCommands>() {
            commands.record(format!("probe {}", ctx.node));
        }

        self.log.push(ProbeEntry::Executed {
            node: ctx.node,
            frame: ctx.frame_index,
        });
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut ResizeContext<'_>) -> Result<(), NodeError> {
        let size = ctx
            .slots
            .input_view(Capability::Texture2D, 0)
            .map_or(ctx.size, |(_, size)| size);
        self.target.ensure(ctx.context.backend(), size, ctx.buffer_count)?;
        if let Some(view) = self.target.view(0) {
            ctx.slots.publish_view(Capability::Texture2D, 0, view, size);
        }
        self.log.push(ProbeEntry::Resized {
            node: ctx.node,
            size: ctx.size,
        });
        Ok(())
    }

    fn on_notify(&mut self, notification: &Notification<'_>, emitter: &mut Emitter) {
        self.log.push(ProbeEntry::Notified {
            node: self.node,
            kind: notification.kind(),
            receiver: notification.receiver,
        });
        if let Event::VariableChanged(value) = notification.event {
            emitter.emit(
                SlotKey::output(Capability::Variable, 0),
                Event::VariableChanged(value.clone()),
            );
        }
    }
}

/// Allocates during init, then fails
struct FailingInit {
    texture: OwnedTexture,
}

impl NodeBehavior for FailingInit {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        self.texture
            .ensure(setup.context.backend(), Extent::new(4, 4), 1)?;
        Err(NodeError::Custom("init refused".to_string()))
    }

    fn unit(&mut self, context: &Context) {
        self.texture.release(context.backend());
    }

    fn execute(&mut self, _ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Registry with the probe node types
pub(crate) fn probe_registry(log: &Arc<ProbeLog>) -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    let probe_log = log.clone();
    registry.register(
        NodeDescriptor::new("probe", "Probe", NodeCategory::Utility),
        move |_| Some(Box::new(Probe::new(probe_log.clone())) as Box<dyn NodeBehavior>),
    );

    let group_log = log.clone();
    registry.register(
        NodeDescriptor::new("probe_group", "Probe Group", NodeCategory::Utility).composite(),
        move |_| Some(Box::new(Probe::new(group_log.clone())) as Box<dyn NodeBehavior>),
    );

    registry.register(
        NodeDescriptor::new("refused", "Refused", NodeCategory::Custom),
        |_| None,
    );

    registry.register(
        NodeDescriptor::new("failing_init", "Failing Init", NodeCategory::Custom),
        |_| {
            Some(Box::new(FailingInit {
                texture: OwnedTexture::new("failing", TextureFormat::Rgba8),
            }) as Box<dyn NodeBehavior>)
        },
    );

    registry
}

/// Empty graph over a headless backend with the probe types registered
pub(crate) fn fixture() -> (Arc<HeadlessBackend>, Arc<ProbeLog>, Graph) {
    let backend = Arc::new(HeadlessBackend::new());
    let log = Arc::new(ProbeLog::default());
    let context = Context::new(backend.clone(), probe_registry(&log));
    (backend, log, Graph::new(context))
}
