//! Deciding where uploaded images go in a workflow, and putting them there.
//!
//! A job injects exactly two uploaded images: the *source* face and the
//! *target* picture. Callers may name the exact `(node_id, input_key)`
//! slots; otherwise the first two nodes with an `image*` input are used,
//! in document order.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::OrchestrationError;
use crate::workflow::{is_image_candidate, NodeRecord, NodeStore};

/// One input slot in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCoordinate {
    /// Node id; JSON integers are accepted and compared as text.
    #[serde(deserialize_with = "node_id_as_string")]
    pub node_id: String,
    pub input_key: String,
}

impl NodeCoordinate {
    pub fn new(node_id: impl Into<String>, input_key: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            input_key: input_key.into(),
        }
    }
}

/// Caller-chosen slots for both images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMapping {
    pub source: NodeCoordinate,
    pub target: NodeCoordinate,
}

/// A single planned write: put `handle` into `slot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub slot: NodeCoordinate,
    pub handle: String,
}

/// The two writes for a job, source first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPlan {
    pub source: Injection,
    pub target: Injection,
}

impl InjectionPlan {
    /// Planned writes in application order.
    pub fn injections(&self) -> [&Injection; 2] {
        [&self.source, &self.target]
    }
}

/// Image-bearing nodes in document order, each paired with its first
/// `image*` input.
pub fn discover_image_inputs(store: &dyn NodeStore) -> Vec<NodeCoordinate> {
    store
        .nodes()
        .filter(|(_, node)| is_image_candidate(node))
        .filter_map(|(id, node)| {
            node.first_image_input()
                .map(|key| NodeCoordinate::new(id, key))
        })
        .collect()
}

/// Build the injection plan for a job.
///
/// With an explicit `mapping` the slots are taken as given; a bad node id
/// only shows up later when [`apply_plan`] updates nothing. Without one,
/// the first two image-bearing nodes receive source and target.
pub fn plan_injections(
    store: &dyn NodeStore,
    mapping: Option<&NodeMapping>,
    source_handle: &str,
    target_handle: &str,
) -> Result<InjectionPlan, OrchestrationError> {
    let (source, target) = match mapping {
        Some(mapping) => (mapping.source.clone(), mapping.target.clone()),
        None => {
            let mut candidates = discover_image_inputs(store).into_iter();
            match (candidates.next(), candidates.next()) {
                (Some(source), Some(target)) => (source, target),
                _ => {
                    return Err(OrchestrationError::Planning(
                        "Could not find two image input nodes in the workflow. \
                         Consider providing 'node_mapping'."
                            .to_string(),
                    ))
                }
            }
        }
    };

    let type_of = |slot: &NodeCoordinate| {
        store
            .get(&slot.node_id)
            .and_then(NodeRecord::type_tag)
            .unwrap_or("<missing>")
            .to_string()
    };
    tracing::debug!(
        explicit = mapping.is_some(),
        source_node = %source.node_id,
        source_type = %type_of(&source),
        source_key = %source.input_key,
        target_node = %target.node_id,
        target_type = %type_of(&target),
        target_key = %target.input_key,
        "Planned image injections",
    );

    Ok(InjectionPlan {
        source: Injection {
            slot: source,
            handle: source_handle.to_string(),
        },
        target: Injection {
            slot: target,
            handle: target_handle.to_string(),
        },
    })
}

/// Write every planned handle into the graph, returning the update count.
///
/// Fails when nothing was updated so an unmodified template is never
/// submitted.
pub fn apply_plan(
    store: &mut dyn NodeStore,
    plan: &InjectionPlan,
) -> Result<usize, OrchestrationError> {
    let mut updated = 0;
    for injection in plan.injections() {
        let slot = &injection.slot;
        if store.set_input(
            &slot.node_id,
            &slot.input_key,
            Value::String(injection.handle.clone()),
        ) {
            updated += 1;
        } else {
            tracing::warn!(
                node_id = %slot.node_id,
                input_key = %slot.input_key,
                "Injection target not found in workflow",
            );
        }
    }

    if updated == 0 {
        return Err(OrchestrationError::Planning(
            "No workflow inputs were updated; check node IDs / keys.".to_string(),
        ));
    }
    Ok(updated)
}

fn node_id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::workflow::WorkflowGraph;

    fn two_loaders_map() -> Value {
        json!({
            "3": { "class_type": "KSampler", "inputs": { "seed": 1, "model": ["4", 0] } },
            "12": { "class_type": "LoadImage", "inputs": { "image": "src.png", "upload": "image" } },
            "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "a face" } },
            "34": { "class_type": "LoadImage", "inputs": { "Image": "tgt.png" } }
        })
    }

    fn two_loaders_list() -> Value {
        json!([
            { "id": 3, "class_type": "KSampler", "inputs": { "seed": 1, "model": ["4", 0] } },
            { "id": 12, "class_type": "LoadImage", "inputs": { "image": "src.png", "upload": "image" } },
            { "id": 7, "class_type": "CLIPTextEncode", "inputs": { "text": "a face" } },
            { "id": 34, "class_type": "LoadImage", "inputs": { "Image": "tgt.png" } }
        ])
    }

    // -- discovery -------------------------------------------------------------

    #[test]
    fn discovery_selects_image_nodes_in_graph_order_for_both_shapes() {
        let expected = vec![
            NodeCoordinate::new("12", "image"),
            NodeCoordinate::new("34", "Image"),
        ];
        for doc in [two_loaders_map(), two_loaders_list()] {
            let graph = WorkflowGraph::from_value(doc).unwrap();
            assert_eq!(discover_image_inputs(graph.store()), expected);
        }
    }

    #[test]
    fn node_with_several_image_inputs_counts_once() {
        let graph = WorkflowGraph::from_value(json!({
            "1": { "class_type": "ImageBatch", "inputs": { "image1": "a.png", "image2": "b.png" } }
        }))
        .unwrap();
        assert_eq!(
            discover_image_inputs(graph.store()),
            vec![NodeCoordinate::new("1", "image1")]
        );
    }

    // -- planning --------------------------------------------------------------

    #[test]
    fn heuristic_plan_uses_first_two_candidates() {
        let graph = WorkflowGraph::from_value(two_loaders_map()).unwrap();
        let plan = plan_injections(graph.store(), None, "s.png", "t.png").unwrap();
        assert_eq!(plan.source.slot, NodeCoordinate::new("12", "image"));
        assert_eq!(plan.source.handle, "s.png");
        assert_eq!(plan.target.slot, NodeCoordinate::new("34", "Image"));
        assert_eq!(plan.target.handle, "t.png");
    }

    #[test]
    fn fewer_than_two_candidates_is_planning_error() {
        let graph = WorkflowGraph::from_value(json!({
            "1": { "class_type": "LoadImage", "inputs": { "image": "only.png" } },
            "2": { "class_type": "SaveImage", "inputs": { "filename_prefix": "out" } }
        }))
        .unwrap();
        assert_matches!(
            plan_injections(graph.store(), None, "s.png", "t.png"),
            Err(OrchestrationError::Planning(msg)) if msg.contains("node_mapping")
        );
    }

    #[test]
    fn failed_planning_leaves_graph_untouched() {
        let doc = json!({ "1": { "class_type": "LoadImage", "inputs": { "image": "only.png" } } });
        let graph = WorkflowGraph::from_value(doc.clone()).unwrap();
        assert!(plan_injections(graph.store(), None, "s.png", "t.png").is_err());
        assert_eq!(graph.to_value(), doc);
    }

    #[test]
    fn explicit_mapping_is_taken_verbatim() {
        let graph = WorkflowGraph::from_value(two_loaders_map()).unwrap();
        let mapping = NodeMapping {
            source: NodeCoordinate::new("34", "Image"),
            target: NodeCoordinate::new("99", "image"),
        };
        let plan = plan_injections(graph.store(), Some(&mapping), "s.png", "t.png").unwrap();
        assert_eq!(plan.source.slot, mapping.source);
        assert_eq!(plan.target.slot, mapping.target);
    }

    // -- applying --------------------------------------------------------------

    #[test]
    fn apply_on_map_and_list_gives_equivalent_graphs() {
        let mut map_graph = WorkflowGraph::from_value(two_loaders_map()).unwrap();
        let mut list_graph = WorkflowGraph::from_value(two_loaders_list()).unwrap();

        let plan = plan_injections(map_graph.store(), None, "s.png", "t.png").unwrap();
        assert_eq!(apply_plan(map_graph.store_mut(), &plan).unwrap(), 2);
        assert_eq!(apply_plan(list_graph.store_mut(), &plan).unwrap(), 2);

        let map_nodes: Vec<_> = map_graph
            .store()
            .nodes()
            .map(|(id, node)| (id, node.inputs.clone()))
            .collect();
        let list_nodes: Vec<_> = list_graph
            .store()
            .nodes()
            .map(|(id, node)| (id, node.inputs.clone()))
            .collect();
        assert_eq!(map_nodes, list_nodes);
        assert_eq!(map_graph.to_value()["12"]["inputs"]["image"], json!("s.png"));
        assert_eq!(list_graph.to_value()[3]["inputs"]["Image"], json!("t.png"));
    }

    #[test]
    fn apply_counts_partial_updates() {
        let mut graph = WorkflowGraph::from_value(two_loaders_map()).unwrap();
        let mapping = NodeMapping {
            source: NodeCoordinate::new("12", "image"),
            target: NodeCoordinate::new("404", "image"),
        };
        let plan = plan_injections(graph.store(), Some(&mapping), "s.png", "t.png").unwrap();
        assert_eq!(apply_plan(graph.store_mut(), &plan).unwrap(), 1);
    }

    #[test]
    fn apply_with_no_matching_nodes_is_planning_error() {
        let mut graph = WorkflowGraph::from_value(two_loaders_list()).unwrap();
        let mapping = NodeMapping {
            source: NodeCoordinate::new("404", "image"),
            target: NodeCoordinate::new("405", "image"),
        };
        let plan = plan_injections(graph.store(), Some(&mapping), "s.png", "t.png").unwrap();
        assert_matches!(
            apply_plan(graph.store_mut(), &plan),
            Err(OrchestrationError::Planning(_))
        );
    }

    // -- mapping payloads ------------------------------------------------------

    #[test]
    fn mapping_accepts_numeric_node_ids() {
        let mapping: NodeMapping = serde_json::from_value(json!({
            "source": { "node_id": 12, "input_key": "image" },
            "target": { "node_id": "34", "input_key": "image" }
        }))
        .unwrap();
        assert_eq!(mapping.source.node_id, "12");
        assert_eq!(mapping.target.node_id, "34");
    }

    #[test]
    fn mapping_without_input_key_is_rejected() {
        let result = serde_json::from_value::<NodeCoordinate>(json!({ "node_id": "1" }));
        assert!(result.is_err());
    }
}
