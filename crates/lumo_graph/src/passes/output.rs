// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output and grouping passes.

use crate::backend::{HeadlessCommands, ResourceId};
use crate::context::Context;
use crate::node::{ExecuteContext, NodeBehavior, NodeError, NodeSetup};
use crate::registry::{NodeCategory, NodeDescriptor, NodeRegistry};
use crate::slot::{Capability, SlotKey};

const IMAGE_IN: SlotKey = SlotKey::input(Capability::Texture2D, 0);

/// Register the output passes
pub fn register(registry: &mut NodeRegistry) {
    registry.register_default::<Present>(
        NodeDescriptor::new("present", "Present", NodeCategory::Output)
            .with_description("Show an image on the output surface"),
    );
    registry.register_default::<Group>(
        NodeDescriptor::new("group", "Group", NodeCategory::Utility)
            .with_description("Runs a nested graph")
            .composite(),
    );
}

/// Final pass handing its input to the presentation surface
#[derive(Debug, Default)]
pub struct Present {
    last: Option<ResourceId>,
}

impl NodeBehavior for Present {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        setup.slots.declare("Image", IMAGE_IN)?;
        Ok(())
    }

    fn unit(&mut self, _context: &Context) {
        self.last = None;
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        let (view, size) = ctx
            .slots
            .input_view(IMAGE_IN.capability, IMAGE_IN.binding)
            .ok_or(NodeError::MissingInput(IMAGE_IN))?;
        if let Some(commands) = ctx.commands.downcast_mut::<HeadlessCommands>() {
            commands.record(format!("present {view} {size}"));
        }
        if ctx.debug.is_some_and(|d| d.trace_bindings) && self.last != Some(view) {
            tracing::trace!("Present {} switched to {view}", ctx.node);
        }
        self.last = Some(view);
        Ok(())
    }
}

/// Composite node whose child graph runs before it
#[derive(Debug, Default)]
pub struct Group;

impl NodeBehavior for Group {
    fn init(&mut self, _setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    fn unit(&mut self, _context: &Context) {}

    fn execute(&mut self, _ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        Ok(())
    }
}
