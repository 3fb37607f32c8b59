// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph persistence.
//!
//! A [`GraphDocument`] is a plain serde tree of nodes, their slots and the
//! link feeding each input. Composite nodes nest their child graph in the
//! node document. Documents are stored as RON.

use crate::context::Context;
use crate::graph::Graph;
use crate::node::{NodeId, NodeParams};
use crate::slot::{Capability, SlotHandle, SlotKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Current document format version
pub const DOCUMENT_VERSION: u32 = 1;

/// Error reading or writing a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The text is not a valid document
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The document could not be encoded
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer version
    #[error("Document version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the document
        found: u32,
        /// Highest supported version
        supported: u32,
    },
}

/// Serialized graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Format version
    pub version: u32,
    /// Nodes in insertion order
    pub nodes: Vec<NodeDocument>,
}

/// Serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    /// Node id at save time
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Registry key
    pub type_key: String,
    /// Editor position
    pub position: [f32; 2],
    /// Input slots with their link sources
    pub inputs: Vec<SlotDocument>,
    /// Output slots
    pub outputs: Vec<SlotDocument>,
    /// Type-specific state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Child graph of a composite node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<GraphDocument>,
}

/// Serialized slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDocument {
    /// Slot name
    pub name: String,
    /// Capability
    pub capability: Capability,
    /// Binding index
    pub binding: u32,
    /// Output feeding this input, if linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LinkSource>,
}

/// Upstream end of a persisted link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSource {
    /// Producing node, by saved id
    pub node: NodeId,
    /// Binding index of the producing output
    pub binding: u32,
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            nodes: Vec::new(),
        }
    }
}

impl GraphDocument {
    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, DocumentError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, DocumentError> {
        let document: Self = ron::from_str(s)?;
        document.check_version()?;
        Ok(document)
    }

    /// Save to a file
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_ron()?)?;
        tracing::info!("Saved graph document to {}", path.display());
        Ok(())
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Total node count including nested children
    pub fn node_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| 1 + n.children.as_ref().map_or(0, Self::node_count))
            .sum()
    }

    fn check_version(&self) -> Result<(), DocumentError> {
        if self.version > DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                found: self.version,
                supported: DOCUMENT_VERSION,
            });
        }
        for child in self.nodes.iter().filter_map(|n| n.children.as_ref()) {
            child.check_version()?;
        }
        Ok(())
    }
}

/// What loading a document did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Nodes created, nested ones included
    pub loaded: usize,
    /// Saved ids that were already taken, with their replacements
    pub remapped: Vec<(NodeId, NodeId)>,
    /// Nodes that could not be created
    pub skipped_nodes: usize,
    /// Links that could not be restored
    pub skipped_links: usize,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.loaded += other.loaded;
        self.remapped.extend(other.remapped);
        self.skipped_nodes += other.skipped_nodes;
        self.skipped_links += other.skipped_links;
    }
}

impl Graph {
    /// Capture the graph, nested children included
    pub fn to_document(&self) -> GraphDocument {
        let nodes = self
            .nodes()
            .map(|node| {
                let id = node.id();
                let inputs = node
                    .slots()
                    .inputs()
                    .map(|slot| SlotDocument {
                        name: slot.name().to_string(),
                        capability: slot.capability(),
                        binding: slot.binding(),
                        source: self
                            .link_into(SlotHandle::new(id, slot.key()))
                            .map(|link| LinkSource {
                                node: link.from.node,
                                binding: link.from.key.binding,
                            }),
                    })
                    .collect();
                let outputs = node
                    .slots()
                    .outputs()
                    .map(|slot| SlotDocument {
                        name: slot.name().to_string(),
                        capability: slot.capability(),
                        binding: slot.binding(),
                        source: None,
                    })
                    .collect();

                NodeDocument {
                    id,
                    name: node.name.clone(),
                    type_key: node.type_key().to_string(),
                    position: node.position,
                    inputs,
                    outputs,
                    payload: node.save_payload(),
                    children: node.subgraph().map(Graph::to_document),
                }
            })
            .collect();

        GraphDocument {
            version: DOCUMENT_VERSION,
            nodes,
        }
    }

    /// Build a new graph from a document
    pub fn from_document(
        context: Arc<Context>,
        document: &GraphDocument,
    ) -> Result<Self, DocumentError> {
        let mut graph = Graph::new(context);
        let report = graph.load_document(document)?;
        tracing::info!(
            "Loaded {} node(s), skipped {} node(s) and {} link(s)",
            report.loaded,
            report.skipped_nodes,
            report.skipped_links
        );
        Ok(graph)
    }

    /// Add the contents of a document to this graph.
    ///
    /// Saved ids are kept when free in the context and remapped otherwise.
    /// Nodes and links that cannot be restored are skipped with a warning.
    pub fn load_document(&mut self, document: &GraphDocument) -> Result<LoadReport, DocumentError> {
        document.check_version()?;
        let mut report = LoadReport::default();
        let mut ids: HashMap<NodeId, NodeId> = HashMap::new();

        for doc in &document.nodes {
            let id = match self.context.claim_id(doc.id) {
                Some(id) => id,
                None => {
                    let fresh = self.context.allocate_id();
                    tracing::warn!("Node id {} already in use; loading as {fresh}", doc.id);
                    report.remapped.push((doc.id, fresh));
                    fresh
                }
            };

            let params = NodeParams {
                name: Some(doc.name.clone()),
                position: doc.position,
            };
            if let Err(e) = self.insert_node(id, &doc.type_key, params) {
                tracing::warn!("Skipping saved node {}: {e}", doc.id);
                report.skipped_nodes +=
                    1 + doc.children.as_ref().map_or(0, GraphDocument::node_count);
                continue;
            }
            ids.insert(doc.id, id);
            report.loaded += 1;

            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if let Some(payload) = &doc.payload {
                if let Err(e) = node.load_payload(payload) {
                    tracing::warn!("Node {id} ignored its saved state: {e}");
                }
            }
            match (node.subgraph_mut(), &doc.children) {
                (Some(subgraph), Some(children)) => report.merge(subgraph.load_document(children)?),
                (None, Some(children)) => {
                    tracing::warn!(
                        "Node {id} ({}) is not composite; dropping {} saved child node(s)",
                        doc.type_key,
                        children.node_count()
                    );
                    report.skipped_nodes += children.node_count();
                }
                _ => {}
            }
        }

        // Links go in once every node exists
        for doc in &document.nodes {
            let Some(&to_node) = ids.get(&doc.id) else {
                continue;
            };
            for slot in &doc.inputs {
                let Some(source) = slot.source else {
                    continue;
                };
                let Some(&from_node) = ids.get(&source.node) else {
                    tracing::warn!(
                        "Dropping link into {to_node}/{} from missing node {}",
                        SlotKey::input(slot.capability, slot.binding),
                        source.node
                    );
                    report.skipped_links += 1;
                    continue;
                };
                let from = SlotHandle::output(from_node, slot.capability, source.binding);
                let to = SlotHandle::input(to_node, slot.capability, slot.binding);
                if let Err(e) = self.connect(from, to) {
                    tracing::warn!("Dropping saved link {from} -> {to}: {e}");
                    report.skipped_links += 1;
                }
            }
        }

        Ok(report)
    }
}
