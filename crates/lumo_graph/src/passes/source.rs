// SPDX-License-Identifier: MIT OR Apache-2.0
//! Source passes: data produced from nothing.

use crate::backend::{HeadlessCommands, OwnedTexture, TextureFormat};
use crate::binding::VariableValue;
use crate::context::Context;
use crate::node::{ExecuteContext, NodeBehavior, NodeError, NodeSetup, ResizeContext};
use crate::notification::Event;
use crate::registry::{NodeCategory, NodeDescriptor, NodeRegistry};
use crate::slot::{Capability, SlotKey};
use serde::{Deserialize, Serialize};

const COLOR_OUT: SlotKey = SlotKey::output(Capability::Texture2D, 0);
const TIME_OUT: SlotKey = SlotKey::output(Capability::Variable, 0);

/// Register the source passes
pub fn register(registry: &mut NodeRegistry) {
    registry.register_default::<SolidColor>(
        NodeDescriptor::new("solid_color", "Solid Color", NodeCategory::Source)
            .with_description("Fill a viewport-sized texture with one color"),
    );
    registry.register_default::<Time>(
        NodeDescriptor::new("time", "Time", NodeCategory::Source)
            .with_description("Elapsed time in seconds"),
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct SolidColorState {
    color: [f32; 4],
}

/// Texture cleared to a constant color every frame
#[derive(Debug)]
pub struct SolidColor {
    color: [f32; 4],
    target: OwnedTexture,
}

impl Default for SolidColor {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            target: OwnedTexture::new("solid_color", TextureFormat::Rgba8),
        }
    }
}

impl SolidColor {
    /// Current fill color
    pub fn color(&self) -> [f32; 4] {
        self.color
    }
}

impl NodeBehavior for SolidColor {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        setup.slots.declare("Color", COLOR_OUT)?;
        Ok(())
    }

    fn unit(&mut self, context: &Context) {
        self.target.release(context.backend());
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        let view = self
            .target
            .view(ctx.frame_index)
            .ok_or_else(|| NodeError::NotReady(format!("{} has no target", ctx.node)))?;
        let size = self.target.size();

        if let Some(commands) = ctx.commands.downcast_mut::<HeadlessCommands>() {
            let [r, g, b, a] = self.color;
            commands.record(format!("clear {view} {size} ({r}, {g}, {b}, {a})"));
        }
        ctx.slots.publish_view(Capability::Texture2D, 0, view, size);
        ctx.events.emit(COLOR_OUT, Event::ResourceUpdated);
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut ResizeContext<'_>) -> Result<(), NodeError> {
        if self.target.ensure(ctx.context.backend(), ctx.size, ctx.buffer_count)? {
            tracing::debug!("Solid color {} reallocated at {}", ctx.node, ctx.size);
        }
        match self.target.view(0) {
            Some(view) => ctx.slots.publish_view(Capability::Texture2D, 0, view, ctx.size),
            None => ctx.slots.set_output(Capability::Texture2D, 0, None),
        };
        Ok(())
    }

    fn save_payload(&self) -> Option<String> {
        ron::to_string(&SolidColorState { color: self.color }).ok()
    }

    fn load_payload(&mut self, payload: &str) -> Result<(), NodeError> {
        let state: SolidColorState =
            ron::from_str(payload).map_err(|e| NodeError::Payload(e.to_string()))?;
        self.color = state.color;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TimeState {
    step: f32,
}

/// Elapsed time derived from the frame index at a fixed step
#[derive(Debug)]
pub struct Time {
    step: f32,
}

impl Default for Time {
    fn default() -> Self {
        Self { step: 1.0 / 60.0 }
    }
}

impl NodeBehavior for Time {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        setup.slots.declare("Seconds", TIME_OUT)?;
        setup.slots.publish_variable(0, VariableValue::Float(0.0));
        Ok(())
    }

    fn unit(&mut self, _context: &Context) {}

    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        let seconds = VariableValue::Float(ctx.frame_index as f32 * self.step);
        if ctx.slots.output_variable(0) != Some(&seconds) {
            ctx.slots.publish_variable(0, seconds.clone());
            ctx.events.emit(TIME_OUT, Event::VariableChanged(seconds));
        }
        Ok(())
    }

    fn save_payload(&self) -> Option<String> {
        ron::to_string(&TimeState { step: self.step }).ok()
    }

    fn load_payload(&mut self, payload: &str) -> Result<(), NodeError> {
        let state: TimeState =
            ron::from_str(payload).map_err(|e| NodeError::Payload(e.to_string()))?;
        if !state.step.is_finite() || state.step < 0.0 {
            return Err(NodeError::Payload(format!("invalid time step {}", state.step)));
        }
        self.step = state.step;
        Ok(())
    }
}
