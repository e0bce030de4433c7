//! The face-swap job pipeline.
//!
//! [`Orchestrator::run`] executes one job start to finish:
//!
//! 1. resolve source and target media to bytes
//! 2. upload both to the engine (`source.png`, `target.png`)
//! 3. take a fresh copy of the workflow template
//! 4. plan and apply the two image injections
//! 5. submit the graph and wait for its output images
//! 6. download every output and base64-encode it
//!
//! Each stage fails fast with one [`OrchestrationError`]; nothing after a
//! failed stage runs. [`Orchestrator::handle_event`] wraps the whole thing
//! so callers always get a well-formed [`JobResponse`].

use std::sync::Arc;
use std::time::Duration;

use facerelay_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use facerelay_comfyui::poll::{wait_for_outputs, Clock, PollConfig, PollError, TokioClock};
use facerelay_comfyui::responses::OutputImage;
use facerelay_core::media::encode_artifact;
use facerelay_core::planner::{apply_plan, plan_injections};
use facerelay_core::request::{JobOutput, JobRequest, JobResponse};
use facerelay_core::workflow::WorkflowGraph;
use facerelay_core::OrchestrationError;
use serde_json::Value;

use crate::assets::AssetResolver;
use crate::config::OrchestratorConfig;
use crate::template::TemplateSource;

const SOURCE_UPLOAD_NAME: &str = "source.png";
const TARGET_UPLOAD_NAME: &str = "target.png";

/// Runs face-swap jobs against one engine instance.
///
/// Holds no per-job state; a single instance serves concurrent jobs.
pub struct Orchestrator {
    api: ComfyUIApi,
    assets: AssetResolver,
    template: TemplateSource,
    poll: PollConfig,
    max_poll_timeout: Duration,
    prompt_envelope: bool,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Build an orchestrator from configuration. With `WORKFLOW_CACHE`
    /// enabled the template is loaded here and a bad file is reported now.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, OrchestrationError> {
        config.validate()?;
        let client = config.http_client()?;
        let template = TemplateSource::from_config(config)?;
        Ok(Self {
            api: ComfyUIApi::with_client(client.clone(), config.comfy_url.clone()),
            assets: AssetResolver::new(client),
            template,
            poll: config.poll,
            max_poll_timeout: config.max_poll_timeout,
            prompt_envelope: config.prompt_envelope,
            clock: Arc::new(TokioClock::default()),
        })
    }

    /// Replace the clock driving the history poll.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate a `{"input": {...}}` event and run it.
    pub async fn handle_event(&self, event: &Value) -> JobResponse {
        let result = match JobRequest::from_event(event) {
            Ok(request) => self.run(&request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::warn!(kind = e.kind(), error = %e.message(), "Face-swap job failed");
        }
        JobResponse::from(result)
    }

    /// Execute one validated job.
    pub async fn run(&self, request: &JobRequest) -> Result<JobOutput, OrchestrationError> {
        let poll = self.poll_config_for(request)?;
        tracing::info!(
            source = %request.source.describe(),
            target = %request.target.describe(),
            explicit_mapping = request.node_mapping.is_some(),
            "Starting face-swap job",
        );

        let source = self.assets.resolve(&request.source).await?;
        let target = self.assets.resolve(&request.target).await?;

        let source_handle = self.upload(SOURCE_UPLOAD_NAME, source).await?;
        let target_handle = self.upload(TARGET_UPLOAD_NAME, target).await?;

        let mut graph = self.template.graph()?;
        let plan = plan_injections(
            graph.store(),
            request.node_mapping.as_ref(),
            &source_handle,
            &target_handle,
        )?;
        let updated = apply_plan(graph.store_mut(), &plan)?;
        if updated < plan.injections().len() {
            tracing::warn!(updated, "Only some planned injections were applied");
        }

        let prompt_id = self.submit(&graph).await?;

        let images = wait_for_outputs(&self.api, &*self.clock, &prompt_id, &poll)
            .await
            .map_err(|e| match e {
                PollError::Api(e) => {
                    engine_error(e, OrchestrationError::Submission, "History query failed")
                }
                timeout @ PollError::Timeout { .. } => {
                    OrchestrationError::Timeout(timeout.to_string())
                }
            })?;

        let outputs_base64 = self.download_all(&images).await?;
        tracing::info!(
            prompt_id = %prompt_id,
            count = outputs_base64.len(),
            "Face-swap job finished",
        );
        Ok(JobOutput::new(prompt_id, outputs_base64))
    }

    /// The job's own ceiling, if any, bounded by the configured maximum.
    fn poll_config_for(&self, request: &JobRequest) -> Result<PollConfig, OrchestrationError> {
        let timeout = match request.poll_timeout {
            Some(timeout) if timeout > self.max_poll_timeout => {
                return Err(OrchestrationError::Input(format!(
                    "timeout_secs must not exceed {}",
                    self.max_poll_timeout.as_secs()
                )))
            }
            Some(timeout) => timeout,
            None => self.poll.timeout,
        };
        Ok(PollConfig {
            timeout,
            ..self.poll
        })
    }

    async fn upload(&self, name_hint: &str, data: Vec<u8>) -> Result<String, OrchestrationError> {
        self.api
            .upload_image(name_hint, data)
            .await
            .map_err(|e| engine_error(e, OrchestrationError::Submission, "Upload failed"))
    }

    async fn submit(&self, graph: &WorkflowGraph) -> Result<String, OrchestrationError> {
        let submitted = if self.prompt_envelope {
            let client_id = uuid::Uuid::new_v4().to_string();
            self.api.submit_workflow(graph, &client_id).await
        } else {
            self.api.submit_graph(graph).await
        };
        let prompt_id = submitted.map_err(|e| {
            engine_error(e, OrchestrationError::Submission, "Prompt submission failed")
        })?;
        tracing::info!(prompt_id = %prompt_id, "Submitted workflow to ComfyUI");
        Ok(prompt_id)
    }

    async fn download_all(
        &self,
        images: &[OutputImage],
    ) -> Result<Vec<String>, OrchestrationError> {
        let mut encoded = Vec::with_capacity(images.len());
        for image in images {
            let bytes = self.api.fetch_output(image).await.map_err(|e| {
                engine_error(
                    e,
                    OrchestrationError::Fetch,
                    &format!("Failed to download {}", image.filename),
                )
            })?;
            encoded.push(encode_artifact(&bytes));
        }
        Ok(encoded)
    }
}

/// Map an engine client error into the taxonomy. Undecodable bodies are
/// always `ProtocolError`; transport and status failures take the kind
/// given by the calling stage.
fn engine_error(
    error: ComfyUIApiError,
    transport: fn(String) -> OrchestrationError,
    context: &str,
) -> OrchestrationError {
    match error {
        ComfyUIApiError::Protocol(msg) => OrchestrationError::Protocol(msg),
        other => transport(format!("{context}: {other}")),
    }
}
