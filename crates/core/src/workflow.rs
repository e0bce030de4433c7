//! ComfyUI workflow graphs as loaded from a template document.
//!
//! Templates come in two shapes: an object keyed by node id
//! (`{"3": {"class_type": ..., "inputs": {...}}}`) or an array of node
//! records that carry their own `id`. Either may also sit under a
//! `"nodes"` member of a larger document. [`WorkflowGraph`] keeps the
//! loaded shape intact through mutation so the submitted JSON looks like
//! the template, and hands out a shape-agnostic [`NodeStore`] for
//! lookups and input rewrites.

use std::path::Path;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::OrchestrationError;

/// Input keys starting with this token (any case) accept image filenames.
pub const IMAGE_INPUT_PREFIX: &str = "image";

/// Document member that wraps the node collection in envelope templates.
const NODES_MEMBER: &str = "nodes";

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A single node: optional id (list form only), type tag and named inputs.
///
/// Any other members (`_meta`, `widgets_values`, ...) are carried in
/// `extra` so they round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_type: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub inputs: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeRecord {
    /// Node type: `class_type` for API exports, `type` for UI exports.
    pub fn type_tag(&self) -> Option<&str> {
        self.class_type
            .as_deref()
            .or_else(|| self.extra.get("type").and_then(Value::as_str))
    }

    /// Input names in document order. Empty when `inputs` is not an object.
    pub fn input_keys(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .as_object()
            .into_iter()
            .flat_map(|inputs| inputs.keys().map(String::as_str))
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.as_object().and_then(|inputs| inputs.get(key))
    }

    /// First input (document order) whose name marks it as an image input.
    pub fn first_image_input(&self) -> Option<&str> {
        self.input_keys().find(|key| is_image_input_key(key))
    }

    /// Overwrite (or insert) one input. Returns `false` when the node has
    /// no input object to write into.
    pub fn set_input(&mut self, key: &str, value: Value) -> bool {
        match self.inputs.as_object_mut() {
            Some(inputs) => {
                inputs.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }
}

/// Whether an input name designates an image input (`image`, `Image2`, ...).
pub fn is_image_input_key(key: &str) -> bool {
    key.get(..IMAGE_INPUT_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(IMAGE_INPUT_PREFIX))
}

/// Whether a node can receive an uploaded image.
pub fn is_image_candidate(node: &NodeRecord) -> bool {
    node.first_image_input().is_some()
}

/// One member of a node collection.
///
/// Anything that does not parse as a node object (numbers, strings,
/// arrays) is kept verbatim and ignored by lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphEntry {
    Node(NodeRecord),
    Opaque(Value),
}

impl GraphEntry {
    pub fn as_node(&self) -> Option<&NodeRecord> {
        match self {
            Self::Node(node) => Some(node),
            Self::Opaque(_) => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut NodeRecord> {
        match self {
            Self::Node(node) => Some(node),
            Self::Opaque(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Node stores
// ---------------------------------------------------------------------------

/// Shape-agnostic access to the nodes of a graph.
pub trait NodeStore {
    /// Look a node up by its string id.
    fn get(&self, id: &str) -> Option<&NodeRecord>;

    /// Overwrite input `key` of node `id`. Returns `false` if the node is
    /// absent or has no input object.
    fn set_input(&mut self, id: &str, key: &str, value: Value) -> bool;

    /// All nodes with their ids, in document order.
    fn nodes(&self) -> Box<dyn Iterator<Item = (String, &NodeRecord)> + '_>;
}

/// Nodes keyed by id, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapNodes(pub IndexMap<String, GraphEntry>);

impl NodeStore for MapNodes {
    fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.0.get(id).and_then(GraphEntry::as_node)
    }

    fn set_input(&mut self, id: &str, key: &str, value: Value) -> bool {
        self.0
            .get_mut(id)
            .and_then(GraphEntry::as_node_mut)
            .is_some_and(|node| node.set_input(key, value))
    }

    fn nodes(&self) -> Box<dyn Iterator<Item = (String, &NodeRecord)> + '_> {
        Box::new(
            self.0
                .iter()
                .filter_map(|(id, entry)| entry.as_node().map(|node| (id.clone(), node))),
        )
    }
}

/// Nodes as an ordered list; each is addressed by its own `id` member,
/// or by its zero-based position when it has none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListNodes(pub Vec<GraphEntry>);

impl ListNodes {
    fn position_of(&self, id: &str) -> Option<usize> {
        self.0.iter().enumerate().position(|(index, entry)| {
            entry
                .as_node()
                .is_some_and(|node| list_node_id(index, node) == id)
        })
    }
}

impl NodeStore for ListNodes {
    fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.position_of(id).and_then(|pos| self.0[pos].as_node())
    }

    fn set_input(&mut self, id: &str, key: &str, value: Value) -> bool {
        match self.position_of(id) {
            Some(pos) => self.0[pos]
                .as_node_mut()
                .is_some_and(|node| node.set_input(key, value)),
            None => false,
        }
    }

    fn nodes(&self) -> Box<dyn Iterator<Item = (String, &NodeRecord)> + '_> {
        Box::new(self.0.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .as_node()
                .map(|node| (list_node_id(index, node), node))
        }))
    }
}

/// String id of a list node: its `id` member compared as text.
fn list_node_id(index: usize, node: &NodeRecord) -> String {
    match &node.id {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => index.to_string(),
    }
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Storage shape of a loaded graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphShape {
    Map,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum NodeCollection {
    Map(MapNodes),
    List(ListNodes),
}

/// A workflow template ready for input injection and submission.
///
/// Cloning produces an independent deep copy, so a cached template can be
/// cloned per job and mutated freely.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    /// Surrounding document when nodes live under `"nodes"`; that member
    /// holds a placeholder and is filled from `nodes` on serialization.
    envelope: Option<Map<String, Value>>,
    nodes: NodeCollection,
}

impl WorkflowGraph {
    /// Read and parse a template file.
    pub fn load(path: &Path) -> Result<Self, OrchestrationError> {
        if !path.exists() {
            return Err(OrchestrationError::Config(format!(
                "Workflow not found at {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::Config(format!(
                "Failed to read workflow at {}: {e}",
                path.display()
            ))
        })?;
        let graph = Self::from_json_str(&text).map_err(|e| {
            OrchestrationError::Config(format!("{} ({})", e.message(), path.display()))
        })?;
        tracing::debug!(
            path = %path.display(),
            shape = ?graph.shape(),
            node_count = graph.node_count(),
            "Loaded workflow template",
        );
        Ok(graph)
    }

    pub fn from_json_str(text: &str) -> Result<Self, OrchestrationError> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| OrchestrationError::Config(format!("Workflow is not valid JSON: {e}")))?;
        Self::from_value(doc)
    }

    /// Interpret a parsed template document.
    pub fn from_value(doc: Value) -> Result<Self, OrchestrationError> {
        match doc {
            Value::Object(mut obj) => {
                let nested = obj
                    .get(NODES_MEMBER)
                    .is_some_and(|nodes| !is_empty_collection(nodes));
                if nested {
                    let nodes = obj.insert(NODES_MEMBER.to_string(), Value::Null);
                    let nodes = collection_from_value(nodes.unwrap_or(Value::Null))?;
                    Ok(Self {
                        envelope: Some(obj),
                        nodes,
                    })
                } else {
                    Ok(Self {
                        envelope: None,
                        nodes: collection_from_value(Value::Object(obj))?,
                    })
                }
            }
            Value::Array(_) => Ok(Self {
                envelope: None,
                nodes: collection_from_value(doc)?,
            }),
            _ => Err(OrchestrationError::Config(
                "Workflow must be a JSON object or array of nodes".to_string(),
            )),
        }
    }

    pub fn shape(&self) -> GraphShape {
        match self.nodes {
            NodeCollection::Map(_) => GraphShape::Map,
            NodeCollection::List(_) => GraphShape::List,
        }
    }

    pub fn store(&self) -> &dyn NodeStore {
        match &self.nodes {
            NodeCollection::Map(nodes) => nodes as &dyn NodeStore,
            NodeCollection::List(nodes) => nodes as &dyn NodeStore,
        }
    }

    pub fn store_mut(&mut self) -> &mut dyn NodeStore {
        match &mut self.nodes {
            NodeCollection::Map(nodes) => nodes as &mut dyn NodeStore,
            NodeCollection::List(nodes) => nodes as &mut dyn NodeStore,
        }
    }

    /// Number of entries that parsed as nodes.
    pub fn node_count(&self) -> usize {
        self.store().nodes().count()
    }

    /// The graph as a JSON document in its original shape.
    pub fn to_value(&self) -> Value {
        // Serializing owned JSON values and string keys cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for WorkflowGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.envelope {
            None => self.nodes.serialize(serializer),
            Some(envelope) => {
                let mut map = serializer.serialize_map(Some(envelope.len()))?;
                for (key, value) in envelope {
                    if key == NODES_MEMBER {
                        map.serialize_entry(key, &self.nodes)?;
                    } else {
                        map.serialize_entry(key, value)?;
                    }
                }
                map.end()
            }
        }
    }
}

fn is_empty_collection(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn collection_from_value(value: Value) -> Result<NodeCollection, OrchestrationError> {
    let collection = match value {
        Value::Object(_) => NodeCollection::Map(
            serde_json::from_value(value)
                .map_err(|e| OrchestrationError::Config(format!("Invalid workflow nodes: {e}")))?,
        ),
        Value::Array(_) => NodeCollection::List(
            serde_json::from_value(value)
                .map_err(|e| OrchestrationError::Config(format!("Invalid workflow nodes: {e}")))?,
        ),
        _ => {
            return Err(OrchestrationError::Config(
                "Workflow 'nodes' must be an object or an array".to_string(),
            ))
        }
    };

    let empty = match &collection {
        NodeCollection::Map(nodes) => nodes.0.is_empty(),
        NodeCollection::List(nodes) => nodes.0.is_empty(),
    };
    if empty {
        return Err(OrchestrationError::Config(
            "Workflow must contain at least one node".to_string(),
        ));
    }
    Ok(collection)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
