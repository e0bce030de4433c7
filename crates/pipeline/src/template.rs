use std::path::PathBuf;
use std::sync::Arc;

use facerelay_core::workflow::WorkflowGraph;
use facerelay_core::OrchestrationError;

use crate::config::OrchestratorConfig;

/// Where each job's workflow graph comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Re-read and parse the file for every job.
    PerRequest(PathBuf),
    /// Parsed once; every job gets its own deep copy.
    Cached(Arc<WorkflowGraph>),
}

impl TemplateSource {
    /// Pick the source per `WORKFLOW_CACHE`. A cached template is loaded
    /// here, so a missing or malformed file fails at startup.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, OrchestrationError> {
        if !config.cache_workflow {
            return Ok(Self::PerRequest(config.workflow_path.clone()));
        }
        let graph = WorkflowGraph::load(&config.workflow_path)?;
        tracing::info!(
            path = %config.workflow_path.display(),
            node_count = graph.node_count(),
            "Cached workflow template",
        );
        Ok(Self::Cached(Arc::new(graph)))
    }

    /// A fresh, independently mutable graph for one job.
    pub fn graph(&self) -> Result<WorkflowGraph, OrchestrationError> {
        match self {
            Self::PerRequest(path) => WorkflowGraph::load(path),
            Self::Cached(graph) => Ok(WorkflowGraph::clone(graph)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use facerelay_core::workflow::NodeStore;
    use serde_json::{json, Value};

    use super::*;

    fn template_file(doc: &Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{doc}").unwrap();
        file
    }

    fn config_for(path: &std::path::Path, cache: bool) -> OrchestratorConfig {
        OrchestratorConfig {
            workflow_path: path.to_path_buf(),
            cache_workflow: cache,
            ..OrchestratorConfig::default()
        }
    }

    #[test]
    fn cached_copies_are_independent() {
        let file = template_file(&json!({
            "1": { "class_type": "LoadImage", "inputs": { "image": "placeholder.png" } }
        }));
        let source = TemplateSource::from_config(&config_for(file.path(), true)).unwrap();
        assert_matches!(source, TemplateSource::Cached(_));

        let mut first = source.graph().unwrap();
        assert!(first.store_mut().set_input("1", "image", json!("mutated.png")));

        let second = source.graph().unwrap();
        assert_eq!(
            second.store().get("1").and_then(|n| n.input("image")),
            Some(&json!("placeholder.png"))
        );
    }

    #[test]
    fn per_request_source_rereads_the_file() {
        let file = template_file(&json!({ "1": { "class_type": "LoadImage", "inputs": {} } }));
        let source = TemplateSource::from_config(&config_for(file.path(), false)).unwrap();
        assert_eq!(source.graph().unwrap().node_count(), 1);

        std::fs::write(
            file.path(),
            json!({
                "1": { "class_type": "LoadImage", "inputs": {} },
                "2": { "class_type": "LoadImage", "inputs": {} }
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(source.graph().unwrap().node_count(), 2);
    }

    #[test]
    fn cached_source_fails_at_startup_for_missing_file() {
        let config = config_for(std::path::Path::new("/nonexistent/workflow.json"), true);
        assert_matches!(
            TemplateSource::from_config(&config),
            Err(OrchestrationError::Config(msg)) if msg.starts_with("Workflow not found")
        );
    }

    #[test]
    fn per_request_source_defers_missing_file() {
        let config = config_for(std::path::Path::new("/nonexistent/workflow.json"), false);
        let source = TemplateSource::from_config(&config).unwrap();
        assert_matches!(source.graph(), Err(OrchestrationError::Config(_)));
    }
}
