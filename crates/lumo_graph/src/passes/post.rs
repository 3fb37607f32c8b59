// SPDX-License-Identifier: MIT OR Apache-2.0
//! Post-processing passes. Each one sizes its target after its first
//! texture input, falling back to the requested size when unlinked.

use crate::backend::{Extent, HeadlessCommands, OwnedTexture, TextureFormat};
use crate::context::Context;
use crate::node::{ExecuteContext, NodeBehavior, NodeError, NodeSetup, ResizeContext};
use crate::notification::{Emitter, Event, EventKind, Notification};
use crate::registry::{NodeCategory, NodeDescriptor, NodeRegistry};
use crate::slot::{Capability, SlotKey, SlotTable};
use serde::{Deserialize, Serialize};

const SOURCE_IN: SlotKey = SlotKey::input(Capability::Texture2D, 0);
const OVERLAY_IN: SlotKey = SlotKey::input(Capability::Texture2D, 1);
const RADIUS_IN: SlotKey = SlotKey::input(Capability::Variable, 0);
const RESULT_OUT: SlotKey = SlotKey::output(Capability::Texture2D, 0);

/// Largest blur radius in texels
pub const MAX_BLUR_RADIUS: f32 = 64.0;

/// Register the post-processing passes
pub fn register(registry: &mut NodeRegistry) {
    registry.register_default::<Blur>(
        NodeDescriptor::new("blur", "Blur", NodeCategory::Filter)
            .with_description("Separable gaussian blur"),
    );
    registry.register_default::<Composite>(
        NodeDescriptor::new("composite", "Composite", NodeCategory::Compositing)
            .with_description("Blend an overlay onto a base image"),
    );
}

/// Reallocate a target to the size of the first texture input
fn resize_target(
    target: &mut OwnedTexture,
    ctx: &mut ResizeContext<'_>,
) -> Result<Extent, NodeError> {
    let size = ctx
        .slots
        .input_view(SOURCE_IN.capability, SOURCE_IN.binding)
        .map_or(ctx.size, |(_, size)| size);
    if target.ensure(ctx.context.backend(), size, ctx.buffer_count)? {
        tracing::debug!("Node {} target reallocated at {size}", ctx.node);
    }
    publish_target(target, ctx.slots, 0);
    Ok(size)
}

fn publish_target(target: &OwnedTexture, slots: &mut SlotTable, frame_index: u64) {
    match target.view(frame_index) {
        Some(view) => {
            slots.publish_view(RESULT_OUT.capability, RESULT_OUT.binding, view, target.size())
        }
        None => slots.set_output(RESULT_OUT.capability, RESULT_OUT.binding, None),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct BlurState {
    radius: f32,
}

/// Gaussian blur of its source input.
///
/// The radius comes from the variable input when linked, from the node's
/// own setting otherwise.
#[derive(Debug)]
pub struct Blur {
    radius: f32,
    kernel: Vec<f32>,
    kernel_radius: Option<f32>,
    target: OwnedTexture,
}

impl Default for Blur {
    fn default() -> Self {
        Self {
            radius: 2.0,
            kernel: Vec::new(),
            kernel_radius: None,
            target: OwnedTexture::new("blur", TextureFormat::Rgba16Float),
        }
    }
}

impl Blur {
    /// Normalized one-dimensional gaussian weights for a radius
    pub fn kernel_for(radius: f32) -> Vec<f32> {
        let radius = radius.clamp(0.0, MAX_BLUR_RADIUS);
        let taps = radius.ceil() as i32;
        if taps == 0 {
            return vec![1.0];
        }
        let sigma = (radius / 2.0).max(0.5);
        let weights: Vec<f32> = (-taps..=taps)
            .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
            .collect();
        let sum: f32 = weights.iter().sum();
        weights.into_iter().map(|w| w / sum).collect()
    }

    fn effective_radius(&self, slots: &SlotTable) -> f32 {
        slots
            .input_variable(RADIUS_IN.binding)
            .and_then(|v| v.as_float())
            .unwrap_or(self.radius)
            .clamp(0.0, MAX_BLUR_RADIUS)
    }
}

impl NodeBehavior for Blur {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        setup.slots.declare("Source", SOURCE_IN)?;
        setup.slots.declare("Radius", RADIUS_IN)?;
        setup.slots.declare("Result", RESULT_OUT)?;
        Ok(())
    }

    fn unit(&mut self, context: &Context) {
        self.target.release(context.backend());
        self.kernel.clear();
        self.kernel_radius = None;
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        let (source, source_size) = ctx
            .slots
            .input_view(SOURCE_IN.capability, SOURCE_IN.binding)
            .ok_or(NodeError::MissingInput(SOURCE_IN))?;
        let target = self
            .target
            .view(ctx.frame_index)
            .ok_or_else(|| NodeError::NotReady(format!("{} has no target", ctx.node)))?;
        if source_size != self.target.size() {
            tracing::debug!(
                "Blur {} reads {source_size} into {}",
                ctx.node,
                self.target.size()
            );
        }

        let radius = self.effective_radius(ctx.slots);
        if self.kernel_radius != Some(radius) {
            self.kernel = Self::kernel_for(radius);
            self.kernel_radius = Some(radius);
        }

        if let Some(commands) = ctx.commands.downcast_mut::<HeadlessCommands>() {
            commands.record(format!("blur {source} -> {target} taps {}", self.kernel.len()));
        }
        publish_target(&self.target, ctx.slots, ctx.frame_index);
        ctx.events.emit(RESULT_OUT, Event::ResourceUpdated);
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut ResizeContext<'_>) -> Result<(), NodeError> {
        resize_target(&mut self.target, ctx)?;
        Ok(())
    }

    fn on_notify(&mut self, notification: &Notification<'_>, _emitter: &mut Emitter) {
        if notification.receiver.key == RADIUS_IN
            && matches!(
                notification.kind(),
                EventKind::VariableChanged | EventKind::LinkDisconnected
            )
        {
            self.kernel_radius = None;
        }
    }

    fn save_payload(&self) -> Option<String> {
        ron::to_string(&BlurState { radius: self.radius }).ok()
    }

    fn load_payload(&mut self, payload: &str) -> Result<(), NodeError> {
        let state: BlurState =
            ron::from_str(payload).map_err(|e| NodeError::Payload(e.to_string()))?;
        self.radius = state.radius.clamp(0.0, MAX_BLUR_RADIUS);
        self.kernel_radius = None;
        Ok(())
    }
}

/// How the overlay combines with the base
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    /// Alpha-blend the overlay over the base
    #[default]
    Over,
    /// Add the overlay
    Add,
    /// Multiply by the overlay
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct CompositeState {
    mode: BlendMode,
}

/// Blend of two images; passes the base through when no overlay is linked
#[derive(Debug)]
pub struct Composite {
    mode: BlendMode,
    target: OwnedTexture,
}

impl Default for Composite {
    fn default() -> Self {
        Self {
            mode: BlendMode::default(),
            target: OwnedTexture::new("composite", TextureFormat::Rgba8),
        }
    }
}

impl NodeBehavior for Composite {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        setup.slots.declare("Base", SOURCE_IN)?;
        setup.slots.declare("Overlay", OVERLAY_IN)?;
        setup.slots.declare("Result", RESULT_OUT)?;
        Ok(())
    }

    fn unit(&mut self, context: &Context) {
        self.target.release(context.backend());
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        let (base, _) = ctx
            .slots
            .input_view(SOURCE_IN.capability, SOURCE_IN.binding)
            .ok_or(NodeError::MissingInput(SOURCE_IN))?;
        let overlay = ctx
            .slots
            .input_view(OVERLAY_IN.capability, OVERLAY_IN.binding);
        let target = self
            .target
            .view(ctx.frame_index)
            .ok_or_else(|| NodeError::NotReady(format!("{} has no target", ctx.node)))?;

        if let Some(commands) = ctx.commands.downcast_mut::<HeadlessCommands>() {
            match overlay {
                Some((overlay, _)) => commands.record(format!(
                    "composite {:?} {base} + {overlay} -> {target}",
                    self.mode
                )),
                None => commands.record(format!("copy {base} -> {target}")),
            }
        }
        publish_target(&self.target, ctx.slots, ctx.frame_index);
        ctx.events.emit(RESULT_OUT, Event::ResourceUpdated);
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut ResizeContext<'_>) -> Result<(), NodeError> {
        resize_target(&mut self.target, ctx)?;
        Ok(())
    }

    fn save_payload(&self) -> Option<String> {
        ron::to_string(&CompositeState { mode: self.mode }).ok()
    }

    fn load_payload(&mut self, payload: &str) -> Result<(), NodeError> {
        let state: CompositeState =
            ron::from_str(payload).map_err(|e| NodeError::Payload(e.to_string()))?;
        self.mode = state.mode;
        Ok(())
    }
}
