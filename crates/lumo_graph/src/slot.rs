// SPDX-License-Identifier: MIT OR Apache-2.0
//! Slot definitions for node inputs/outputs.
//!
//! Every node owns a [`SlotTable`]: its declared slots keyed by direction,
//! capability and binding index, together with the binding each slot
//! currently holds. Capability getters and setters are queries against that
//! table; asking for a binding the node never declared yields `None`.

use crate::backend::{Extent, ResourceId};
use crate::binding::{Binding, TaskToken, VariableValue};
use crate::node::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotDirection {
    /// Input slot
    Input,
    /// Output slot
    Output,
}

impl SlotDirection {
    /// The other direction
    pub fn opposite(&self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// Kind of data a slot carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// 2D texture
    Texture2D,
    /// Cube texture
    TextureCube,
    /// Storage buffer
    StorageBuffer,
    /// Texel buffer
    TexelBuffer,
    /// Mesh/model
    Model,
    /// Group of lights
    LightGroup,
    /// Ray tracing acceleration structure
    AccelStructure,
    /// Scalar/vector variable
    Variable,
    /// Task completion dependency
    Task,
}

impl Capability {
    /// All capabilities
    pub fn all() -> &'static [Capability] {
        &[
            Capability::Texture2D,
            Capability::TextureCube,
            Capability::StorageBuffer,
            Capability::TexelBuffer,
            Capability::Model,
            Capability::LightGroup,
            Capability::AccelStructure,
            Capability::Variable,
            Capability::Task,
        ]
    }

    /// Whether resources of this kind depend on the producer's size.
    ///
    /// Resize cascades only travel along links of sized capabilities.
    pub fn is_sized(&self) -> bool {
        matches!(
            self,
            Self::Texture2D | Self::TextureCube | Self::StorageBuffer | Self::TexelBuffer
        )
    }

    /// Short name used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Texture2D => "texture2d",
            Self::TextureCube => "texture_cube",
            Self::StorageBuffer => "storage_buffer",
            Self::TexelBuffer => "texel_buffer",
            Self::Model => "model",
            Self::LightGroup => "light_group",
            Self::AccelStructure => "accel_structure",
            Self::Variable => "variable",
            Self::Task => "task",
        }
    }
}

/// Identifies a slot within its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    /// Direction
    pub direction: SlotDirection,
    /// Capability
    pub capability: Capability,
    /// Binding index, independent per direction and capability
    pub binding: u32,
}

impl SlotKey {
    /// Key of an input slot
    pub const fn input(capability: Capability, binding: u32) -> Self {
        Self {
            direction: SlotDirection::Input,
            capability,
            binding,
        }
    }

    /// Key of an output slot
    pub const fn output(capability: Capability, binding: u32) -> Self {
        Self {
            direction: SlotDirection::Output,
            capability,
            binding,
        }
    }

    /// Whether this is an input key
    pub fn is_input(&self) -> bool {
        self.direction == SlotDirection::Input
    }

    /// Whether this is an output key
    pub fn is_output(&self) -> bool {
        self.direction == SlotDirection::Output
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SlotDirection::Input => "in",
            SlotDirection::Output => "out",
        };
        write!(f, "{dir}:{}[{}]", self.capability.label(), self.binding)
    }
}

/// Graph-wide reference to a slot: owning node plus slot key.
///
/// Handles are plain values; they are re-resolved through the graph on every
/// use and simply fail to resolve once the node is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotHandle {
    /// Owning node
    pub node: NodeId,
    /// Slot within the node
    pub key: SlotKey,
}

impl SlotHandle {
    /// Create a handle
    pub const fn new(node: NodeId, key: SlotKey) -> Self {
        Self { node, key }
    }

    /// Handle of an input slot
    pub const fn input(node: NodeId, capability: Capability, binding: u32) -> Self {
        Self::new(node, SlotKey::input(capability, binding))
    }

    /// Handle of an output slot
    pub const fn output(node: NodeId, capability: Capability, binding: u32) -> Self {
        Self::new(node, SlotKey::output(capability, binding))
    }
}

impl fmt::Display for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.key)
    }
}

/// A slot on a node
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    name: String,
    key: SlotKey,
    value: Option<Binding>,
}

impl Slot {
    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key within the owning node
    pub fn key(&self) -> SlotKey {
        self.key
    }

    /// Capability
    pub fn capability(&self) -> Capability {
        self.key.capability
    }

    /// Direction
    pub fn direction(&self) -> SlotDirection {
        self.key.direction
    }

    /// Binding index
    pub fn binding(&self) -> u32 {
        self.key.binding
    }

    /// Current binding
    pub fn value(&self) -> Option<&Binding> {
        self.value.as_ref()
    }
}

/// Error declaring a slot
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SlotError {
    /// The key is already declared on this node
    #[error("Slot already declared: {0}")]
    Duplicate(SlotKey),
}

/// The slots of one node, in declaration order
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    slots: IndexMap<SlotKey, Slot>,
}

impl SlotTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a slot
    pub fn declare(&mut self, name: impl Into<String>, key: SlotKey) -> Result<SlotKey, SlotError> {
        if self.slots.contains_key(&key) {
            return Err(SlotError::Duplicate(key));
        }
        self.slots.insert(
            key,
            Slot {
                name: name.into(),
                key,
                value: None,
            },
        );
        Ok(key)
    }

    /// Declare an input slot
    pub fn declare_input(
        &mut self,
        name: impl Into<String>,
        capability: Capability,
        binding: u32,
    ) -> Result<SlotKey, SlotError> {
        self.declare(name, SlotKey::input(capability, binding))
    }

    /// Declare an output slot
    pub fn declare_output(
        &mut self,
        name: impl Into<String>,
        capability: Capability,
        binding: u32,
    ) -> Result<SlotKey, SlotError> {
        self.declare(name, SlotKey::output(capability, binding))
    }

    /// Get a slot by key
    pub fn get(&self, key: &SlotKey) -> Option<&Slot> {
        self.slots.get(key)
    }

    /// Whether a slot is declared
    pub fn contains(&self, key: &SlotKey) -> bool {
        self.slots.contains_key(key)
    }

    /// All slots in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    /// Input slots in declaration order
    pub fn inputs(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values().filter(|s| s.key.is_input())
    }

    /// Output slots in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values().filter(|s| s.key.is_output())
    }

    /// Number of declared slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is declared
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Capabilities declared in a direction, in first-declaration order
    pub fn capabilities(&self, direction: SlotDirection) -> Vec<Capability> {
        let mut found = Vec::new();
        for slot in self.slots.values().filter(|s| s.key.direction == direction) {
            if !found.contains(&slot.key.capability) {
                found.push(slot.key.capability);
            }
        }
        found
    }

    /// Whether any slot of the capability is declared in a direction
    pub fn has_capability(&self, direction: SlotDirection, capability: Capability) -> bool {
        self.slots
            .keys()
            .any(|k| k.direction == direction && k.capability == capability)
    }

    /// Current binding of a slot
    pub fn value(&self, key: &SlotKey) -> Option<&Binding> {
        self.slots.get(key)?.value.as_ref()
    }

    /// Replace the binding of a slot.
    ///
    /// Returns false if the slot is undeclared or the binding does not fit
    /// its capability; nothing changes in that case.
    pub fn assign(&mut self, key: SlotKey, value: Option<Binding>) -> bool {
        let Some(slot) = self.slots.get_mut(&key) else {
            return false;
        };
        if let Some(binding) = &value {
            if !binding.fits(key.capability) {
                return false;
            }
        }
        slot.value = value;
        true
    }

    /// Drop every binding held by the table
    pub fn clear_values(&mut self) {
        for slot in self.slots.values_mut() {
            slot.value = None;
        }
    }

    /// Binding of an input slot
    pub fn input(&self, capability: Capability, binding: u32) -> Option<&Binding> {
        self.value(&SlotKey::input(capability, binding))
    }

    /// Set the binding of an input slot
    pub fn set_input(
        &mut self,
        capability: Capability,
        binding: u32,
        value: Option<Binding>,
    ) -> bool {
        self.assign(SlotKey::input(capability, binding), value)
    }

    /// Binding of an output slot
    pub fn output(&self, capability: Capability, binding: u32) -> Option<&Binding> {
        self.value(&SlotKey::output(capability, binding))
    }

    /// Set the binding of an output slot
    pub fn set_output(
        &mut self,
        capability: Capability,
        binding: u32,
        value: Option<Binding>,
    ) -> bool {
        self.assign(SlotKey::output(capability, binding), value)
    }

    /// Texture view and size exposed by an output slot
    pub fn output_view(
        &self,
        capability: Capability,
        binding: u32,
    ) -> Option<(ResourceId, Extent)> {
        match self.output(capability, binding)? {
            Binding::Texture { view, size } => Some((*view, *size)),
            _ => None,
        }
    }

    /// Publish a texture view on an output slot
    pub fn publish_view(
        &mut self,
        capability: Capability,
        binding: u32,
        view: ResourceId,
        size: Extent,
    ) -> bool {
        self.set_output(capability, binding, Some(Binding::texture(view, size)))
    }

    /// Texture view and size received by an input slot
    pub fn input_view(&self, capability: Capability, binding: u32) -> Option<(ResourceId, Extent)> {
        match self.input(capability, binding)? {
            Binding::Texture { view, size } => Some((*view, *size)),
            _ => None,
        }
    }

    /// Set the texture view of an input slot
    pub fn set_input_view(
        &mut self,
        capability: Capability,
        binding: u32,
        view: ResourceId,
        size: Extent,
    ) -> bool {
        self.set_input(capability, binding, Some(Binding::texture(view, size)))
    }

    /// Buffer and byte size received by an input slot
    pub fn input_buffer(&self, capability: Capability, binding: u32) -> Option<(ResourceId, u64)> {
        match self.input(capability, binding)? {
            Binding::Buffer { buffer, size } => Some((*buffer, *size)),
            _ => None,
        }
    }

    /// Buffer and size exposed by an output slot
    pub fn output_buffer(&self, capability: Capability, binding: u32) -> Option<(ResourceId, u64)> {
        match self.output(capability, binding)? {
            Binding::Buffer { buffer, size } => Some((*buffer, *size)),
            _ => None,
        }
    }

    /// Publish a buffer on an output slot
    pub fn publish_buffer(
        &mut self,
        capability: Capability,
        binding: u32,
        buffer: ResourceId,
        size: u64,
    ) -> bool {
        self.set_output(capability, binding, Some(Binding::buffer(buffer, size)))
    }

    /// Model, light group or acceleration structure received by an input slot
    pub fn input_resource(&self, capability: Capability, binding: u32) -> Option<ResourceId> {
        match self.input(capability, binding)? {
            Binding::Model(id) | Binding::LightGroup(id) | Binding::AccelStructure(id) => Some(*id),
            _ => None,
        }
    }

    /// Variable received by an input slot
    pub fn input_variable(&self, binding: u32) -> Option<&VariableValue> {
        match self.input(Capability::Variable, binding)? {
            Binding::Variable(value) => Some(value),
            _ => None,
        }
    }

    /// Variable exposed by an output slot
    pub fn output_variable(&self, binding: u32) -> Option<&VariableValue> {
        match self.output(Capability::Variable, binding)? {
            Binding::Variable(value) => Some(value),
            _ => None,
        }
    }

    /// Publish a variable on an output slot
    pub fn publish_variable(&mut self, binding: u32, value: VariableValue) -> bool {
        self.set_output(Capability::Variable, binding, Some(Binding::Variable(value)))
    }

    /// Task token received by an input slot
    pub fn input_task(&self, binding: u32) -> Option<TaskToken> {
        match self.input(Capability::Task, binding)? {
            Binding::Task(token) => Some(*token),
            _ => None,
        }
    }

    /// Publish a task token on an output slot
    pub fn publish_task(&mut self, binding: u32, token: TaskToken) -> bool {
        self.set_output(Capability::Task, binding, Some(Binding::Task(token)))
    }
}
