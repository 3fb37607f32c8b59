// SPDX-License-Identifier: MIT OR Apache-2.0
//! Particle simulation.

use crate::backend::{HeadlessCommands, OwnedBuffer};
use crate::context::Context;
use crate::node::{ExecuteContext, NodeBehavior, NodeError, NodeSetup, ResizeContext};
use crate::notification::Event;
use crate::registry::{NodeCategory, NodeDescriptor, NodeRegistry};
use crate::slot::{Capability, SlotKey, SlotTable};
use serde::{Deserialize, Serialize};

/// Bytes per simulated particle: position, velocity, age and lifetime
pub const PARTICLE_STRIDE: u64 = 32;

const COUNT_IN: SlotKey = SlotKey::input(Capability::Variable, 0);
const PARTICLES_OUT: SlotKey = SlotKey::output(Capability::StorageBuffer, 0);

/// Register the simulation passes
pub fn register(registry: &mut NodeRegistry) {
    registry.register_default::<Particles>(
        NodeDescriptor::new("particles", "Particles", NodeCategory::Simulation)
            .with_description("GPU particle state buffer"),
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ParticlesState {
    count: u32,
}

/// Particle state buffer, one copy per frame in flight.
///
/// The particle count comes from the variable input when linked; changing
/// it reallocates the buffer on the next execution.
#[derive(Debug)]
pub struct Particles {
    count: u32,
    buffer_count: u32,
    buffer: OwnedBuffer,
}

impl Default for Particles {
    fn default() -> Self {
        Self {
            count: 1024,
            buffer_count: 1,
            buffer: OwnedBuffer::new("particles"),
        }
    }
}

impl Particles {
    fn allocate(&mut self, context: &Context, count: u32) -> Result<bool, NodeError> {
        let size = u64::from(count) * PARTICLE_STRIDE;
        Ok(self.buffer.ensure(context.backend(), size, self.buffer_count)?)
    }

    fn publish(&self, slots: &mut SlotTable, frame_index: u64) {
        match self.buffer.view(frame_index) {
            Some(buffer) => slots.publish_buffer(
                PARTICLES_OUT.capability,
                PARTICLES_OUT.binding,
                buffer,
                self.buffer.size(),
            ),
            None => slots.set_output(PARTICLES_OUT.capability, PARTICLES_OUT.binding, None),
        };
    }
}

impl NodeBehavior for Particles {
    fn init(&mut self, setup: &mut NodeSetup<'_>) -> Result<(), NodeError> {
        setup.slots.declare("Count", COUNT_IN)?;
        setup.slots.declare("Particles", PARTICLES_OUT)?;
        Ok(())
    }

    fn unit(&mut self, context: &Context) {
        self.buffer.release(context.backend());
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_, '_>) -> Result<(), NodeError> {
        let count = ctx
            .slots
            .input_variable(COUNT_IN.binding)
            .and_then(|v| v.as_float())
            .map_or(self.count, |c| c.max(0.0) as u32);
        if self.allocate(ctx.context, count)? {
            tracing::debug!("Particles {} now hold {count} particle(s)", ctx.node);
        }

        if let (Some(buffer), Some(commands)) = (
            self.buffer.view(ctx.frame_index),
            ctx.commands.downcast_mut::<HeadlessCommands>(),
        ) {
            commands.record(format!("simulate {count} particle(s) in {buffer}"));
        }
        self.publish(ctx.slots, ctx.frame_index);
        ctx.events.emit(PARTICLES_OUT, Event::ResourceUpdated);
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut ResizeContext<'_>) -> Result<(), NodeError> {
        self.buffer_count = ctx.buffer_count.max(1);
        let count = ctx
            .slots
            .input_variable(COUNT_IN.binding)
            .and_then(|v| v.as_float())
            .map_or(self.count, |c| c.max(0.0) as u32);
        self.allocate(ctx.context, count)?;
        self.publish(ctx.slots, 0);
        Ok(())
    }

    fn save_payload(&self) -> Option<String> {
        ron::to_string(&ParticlesState { count: self.count }).ok()
    }

    fn load_payload(&mut self, payload: &str) -> Result<(), NodeError> {
        let state: ParticlesState =
            ron::from_str(payload).map_err(|e| NodeError::Payload(e.to_string()))?;
        self.count = state.count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Extent, HeadlessBackend};
    use crate::execution::FrameContext;
    use crate::graph::Graph;
    use crate::passes::create_builtin_registry;
    use crate::slot::SlotHandle;
    use std::sync::Arc;

    fn setup() -> (Arc<HeadlessBackend>, Graph) {
        let backend = Arc::new(HeadlessBackend::new());
        let context = Context::new(backend.clone(), create_builtin_registry());
        (backend, Graph::new(context))
    }

    #[test]
    fn test_buffer_sized_by_count_and_buffer_count() {
        let (backend, mut graph) = setup();
        let particles = graph.add_node("particles").unwrap();
        graph.resize_all(Extent::new(1, 1), 3).unwrap();

        assert_eq!(backend.live_count(), 3);
        assert_eq!(backend.live_bytes(), 1024 * PARTICLE_STRIDE * 3);
        let (_, size) = graph
            .node(particles)
            .unwrap()
            .slots()
            .output_buffer(Capability::StorageBuffer, 0)
            .unwrap();
        assert_eq!(size, 1024 * PARTICLE_STRIDE);
    }

    #[test]
    fn test_count_input_reallocates() {
        let (backend, mut graph) = setup();
        let time = graph.add_node("time").unwrap();
        let particles = graph.add_node("particles").unwrap();
        graph
            .connect(
                SlotHandle::output(time, Capability::Variable, 0),
                SlotHandle::input(particles, Capability::Variable, 0),
            )
            .unwrap();
        graph.resize_all(Extent::new(1, 1), 2).unwrap();

        // Time at frame 600 is 10 seconds, read as 10 particles
        graph.execute_frame(&mut FrameContext::detached(600));
        assert_eq!(backend.live_count(), 2);
        assert_eq!(backend.live_bytes(), 10 * PARTICLE_STRIDE * 2);
    }

    #[test]
    fn test_payload_count() {
        let (backend, mut graph) = setup();
        let particles = graph.add_node("particles").unwrap();
        graph
            .node_mut(particles)
            .unwrap()
            .load_payload("(count: 16)")
            .unwrap();
        let saved = graph.node(particles).unwrap().save_payload().unwrap();
        assert!(saved.contains("16"));
        graph.resize_all(Extent::new(1, 1), 1).unwrap();
        assert_eq!(backend.live_bytes(), 16 * PARTICLE_STRIDE);
    }
}
