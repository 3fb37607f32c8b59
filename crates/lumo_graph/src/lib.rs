// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph core for Lumo.
//!
//! A graph of render passes connected through typed slots:
//! - Nodes declare input and output slots tagged with a capability
//! - Links carry bindings from one output to many inputs
//! - Each frame runs every node once in dependency order
//! - Change notifications and size changes travel downstream along links
//!
//! ## Architecture
//!
//! The [`Graph`] owns its nodes and links; callers hold [`NodeId`] and
//! [`SlotHandle`] values that are revalidated on every use. Node types are
//! looked up by key in the [`NodeRegistry`] of a shared [`Context`], which
//! also holds the device [`Backend`]. Graphs are persisted as RON
//! [`GraphDocument`]s.

pub mod backend;
pub mod binding;
pub mod context;
pub mod document;
pub mod execution;
pub mod graph;
pub mod link;
pub mod node;
pub mod notification;
pub mod passes;
pub mod registry;
pub mod resize;
pub mod slot;

#[cfg(test)]
mod testing;

pub use backend::{
    Backend, BackendError, CommandHandle, Extent, HeadlessBackend, HeadlessCommands, OwnedBuffer,
    OwnedTexture, ResourceId, TextureFormat,
};
pub use binding::{Binding, TaskToken, VariableValue};
pub use context::Context;
pub use document::{DocumentError, GraphDocument, LoadReport, NodeDocument, DOCUMENT_VERSION};
pub use execution::{DebugState, FrameContext, FrameReport};
pub use graph::{ConnectError, CycleError, Graph, GraphError};
pub use link::Link;
pub use node::{
    ExecuteContext, Node, NodeBehavior, NodeError, NodeId, NodeParams, NodeSetup, ResizeContext,
};
pub use notification::{Emitter, Event, EventKind, Notification};
pub use passes::create_builtin_registry;
pub use registry::{NodeCategory, NodeDescriptor, NodeRegistry};
pub use resize::ResizeReport;
pub use slot::{Capability, Slot, SlotDirection, SlotError, SlotHandle, SlotKey, SlotTable};
