// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of node types.
//!
//! Concrete passes register a descriptor and a factory under a string key;
//! the graph constructs nodes by key and never names concrete types.

use crate::context::Context;
use crate::node::NodeBehavior;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Produces data from nothing (colors, time, loaders)
    Source,
    /// Image filters and post-processing
    Filter,
    /// Combines several inputs
    Compositing,
    /// Mesh generation
    Geometry,
    /// Particle and physics simulation
    Simulation,
    /// Final outputs (present, capture)
    Output,
    /// Grouping and utility nodes
    Utility,
    /// Custom/user-defined
    Custom,
}

/// Node type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique type key
    pub key: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Whether instances own a child graph
    pub composite: bool,
}

impl NodeDescriptor {
    /// Create a descriptor
    pub fn new(key: impl Into<String>, name: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            category,
            description: String::new(),
            composite: false,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark instances as owning a child graph
    pub fn composite(mut self) -> Self {
        self.composite = true;
        self
    }
}

/// Constructor of a node behavior; `None` when the type cannot be built
pub type NodeFactory = Box<dyn Fn(&Context) -> Option<Box<dyn NodeBehavior>> + Send + Sync>;

struct Registration {
    descriptor: NodeDescriptor,
    factory: NodeFactory,
}

/// Registry of available node types
#[derive(Default)]
pub struct NodeRegistry {
    types: IndexMap<String, Registration>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type, replacing any previous registration of the key
    pub fn register<F>(&mut self, descriptor: NodeDescriptor, factory: F)
    where
        F: Fn(&Context) -> Option<Box<dyn NodeBehavior>> + Send + Sync + 'static,
    {
        let key = descriptor.key.clone();
        let previous = self.types.insert(
            key.clone(),
            Registration {
                descriptor,
                factory: Box::new(factory),
            },
        );
        if previous.is_some() {
            tracing::warn!("Node type {key} registered twice; keeping the latest");
        }
    }

    /// Register a behavior built through `Default`
    pub fn register_default<T>(&mut self, descriptor: NodeDescriptor)
    where
        T: NodeBehavior + Default + 'static,
    {
        self.register(descriptor, |_| Some(Box::new(T::default()) as Box<dyn NodeBehavior>));
    }

    /// Get a node type by key
    pub fn get(&self, key: &str) -> Option<&NodeDescriptor> {
        self.types.get(key).map(|r| &r.descriptor)
    }

    /// Whether a key is registered
    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    /// All registered types in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.types.values().map(|r| &r.descriptor)
    }

    /// Types in a category
    pub fn in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeDescriptor> {
        self.descriptors().filter(move |d| d.category == category)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Run the factory of a type
    pub(crate) fn construct(&self, key: &str, context: &Context) -> Option<Box<dyn NodeBehavior>> {
        let registration = self.types.get(key)?;
        (registration.factory)(context)
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.keys()).finish()
    }
}
