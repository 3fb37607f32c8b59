// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in headless passes.
//!
//! They record labelled commands into [`HeadlessCommands`](crate::backend::HeadlessCommands)
//! when one is attached to the frame, and otherwise only manage their
//! resources and bindings.

pub mod output;
pub mod post;
pub mod simulation;
pub mod source;

use crate::registry::NodeRegistry;

/// Create a registry holding every built-in pass
pub fn create_builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtin_passes(&mut registry);
    registry
}

/// Add the built-in passes to a registry
pub fn register_builtin_passes(registry: &mut NodeRegistry) {
    source::register(registry);
    post::register(registry);
    simulation::register(registry);
    output::register(registry);
}
