// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values carried across links.
//!
//! A [`Binding`] is a non-owning reference to whatever an output slot
//! currently exposes: a texture view with its size, a buffer, a scene
//! resource, a scalar variable or a task token. Bindings are copied into
//! downstream input slots every frame; the producing node keeps ownership
//! of the underlying resource.

use crate::backend::{Extent, ResourceId};
use crate::node::NodeId;
use crate::slot::Capability;
use serde::{Deserialize, Serialize};

/// Scalar or vector value flowing through variable slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i32),
    /// Floating point
    Float(f32),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// Color (RGBA)
    Color([f32; 4]),
    /// String
    String(String),
}

impl VariableValue {
    /// Read the value as a float, converting integers and booleans
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Vector2(_) => "vec2",
            Self::Vector3(_) => "vec3",
            Self::Vector4(_) => "vec4",
            Self::Color(_) => "color",
            Self::String(_) => "string",
        }
    }
}

/// Marker that a task-producing node finished its work for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskToken {
    /// Node that produced the task
    pub producer: NodeId,
    /// Frame the task belongs to
    pub frame: u64,
}

/// Current value of a slot
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Texture view and its size (2D and cube textures)
    Texture {
        /// View of the image for the current frame
        view: ResourceId,
        /// Size of the image
        size: Extent,
    },
    /// Storage or texel buffer
    Buffer {
        /// Buffer for the current frame
        buffer: ResourceId,
        /// Size in bytes
        size: u64,
    },
    /// Mesh/model data
    Model(ResourceId),
    /// Group of lights
    LightGroup(ResourceId),
    /// Ray tracing acceleration structure
    AccelStructure(ResourceId),
    /// Scalar or vector variable
    Variable(VariableValue),
    /// Task completion token
    Task(TaskToken),
}

impl Binding {
    /// Create a texture binding
    pub fn texture(view: ResourceId, size: Extent) -> Self {
        Self::Texture { view, size }
    }

    /// Create a buffer binding
    pub fn buffer(buffer: ResourceId, size: u64) -> Self {
        Self::Buffer { buffer, size }
    }

    /// Whether a slot of the given capability may hold this binding
    pub fn fits(&self, capability: Capability) -> bool {
        matches!(
            (self, capability),
            (Self::Texture { .. }, Capability::Texture2D | Capability::TextureCube)
                | (Self::Buffer { .. }, Capability::StorageBuffer | Capability::TexelBuffer)
                | (Self::Model(_), Capability::Model)
                | (Self::LightGroup(_), Capability::LightGroup)
                | (Self::AccelStructure(_), Capability::AccelStructure)
                | (Self::Variable(_), Capability::Variable)
                | (Self::Task(_), Capability::Task)
        )
    }

    /// Device resource referenced by the binding, if any
    pub fn resource(&self) -> Option<ResourceId> {
        match self {
            Self::Texture { view, .. } => Some(*view),
            Self::Buffer { buffer, .. } => Some(*buffer),
            Self::Model(id) | Self::LightGroup(id) | Self::AccelStructure(id) => Some(*id),
            Self::Variable(_) | Self::Task(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_fits_capability_family() {
        let texture = Binding::texture(ResourceId(1), Extent::new(4, 4));
        assert!(texture.fits(Capability::Texture2D));
        assert!(texture.fits(Capability::TextureCube));
        assert!(!texture.fits(Capability::StorageBuffer));

        let variable = Binding::Variable(VariableValue::Float(1.0));
        assert!(variable.fits(Capability::Variable));
        assert!(!variable.fits(Capability::Task));
        assert_eq!(variable.resource(), None);
    }

    #[test]
    fn test_variable_float_conversion() {
        assert_eq!(VariableValue::Int(3).as_float(), Some(3.0));
        assert_eq!(VariableValue::Bool(true).as_float(), Some(1.0));
        assert_eq!(VariableValue::String("x".into()).as_float(), None);
    }
}
