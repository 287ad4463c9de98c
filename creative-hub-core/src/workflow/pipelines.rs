//! Step pipelines: template-based chains of generation steps
//!
//! A pipeline is created from an optional template, then either executed one
//! step at a time or run as a whole in a background task. Each step type maps
//! to a registered [`StepExecutor`].

use crate::errors::{HubError, HubResult};
use crate::models::{
    builtin_templates, CreatePipelineRequest, Pipeline, PipelineRunTicket, PipelineStatus,
    PipelineStep, PipelineTemplate, StepExecution, StepKind, StepStatus,
};
use crate::providers::{GenerationRequest, ProviderGateway, Sourced};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

/// Executes one step type
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, input: &Value) -> HubResult<Sourced<Value>>;
}

/// Step backed by the provider gateway, after a fixed simulated delay
pub struct GatewayStep {
    kind: StepKind,
    gateway: Arc<ProviderGateway>,
    delay: Duration,
}

impl GatewayStep {
    pub fn new(kind: StepKind, gateway: Arc<ProviderGateway>, delay: Duration) -> Self {
        Self {
            kind,
            gateway,
            delay,
        }
    }
}

#[async_trait]
impl StepExecutor for GatewayStep {
    async fn execute(&self, input: &Value) -> HubResult<Sourced<Value>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let request = GenerationRequest::new(self.kind.category(), self.kind.as_str(), input.clone());
        self.gateway.generate(request).await
    }
}

/// Step type → executor mapping
#[derive(Default, Clone)]
pub struct StepExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl StepExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in step type routed through `gateway`
    pub fn with_gateway(gateway: Arc<ProviderGateway>, delay: Duration) -> Self {
        let mut registry = Self::new();
        for kind in StepKind::ALL {
            registry.register(
                kind.as_str(),
                Arc::new(GatewayStep::new(kind, gateway.clone(), delay)),
            );
        }
        registry
    }

    pub fn register(&mut self, step_type: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(step_type.into(), executor);
    }

    pub fn get(&self, step_type: &str) -> HubResult<Arc<dyn StepExecutor>> {
        self.executors
            .get(step_type)
            .cloned()
            .ok_or_else(|| HubError::UnknownStepType(step_type.to_string()))
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.executors.contains_key(step_type)
    }
}

/// Built-in templates plus any from a YAML file; ids must be unique
pub fn load_templates(path: Option<&Path>) -> anyhow::Result<Vec<PipelineTemplate>> {
    let mut templates = builtin_templates();
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read templates file {}", path.display()))?;
        let extra: Vec<PipelineTemplate> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse templates file {}", path.display()))?;
        templates.extend(extra);
    }

    let mut seen = HashSet::new();
    for template in &templates {
        if !seen.insert(template.id.as_str()) {
            anyhow::bail!("Duplicate pipeline template id '{}'", template.id);
        }
    }
    Ok(templates)
}

fn pipeline_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("workflow-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Merge a step output into the input passed to the next step
fn thread_input(input: &Value, output: &Value) -> Value {
    let mut next = match input {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Value::Object(fields) = output {
        for (key, value) in fields {
            next.insert(key.clone(), value.clone());
        }
        if let Some(prompt) = fields.get("optimizedPrompt") {
            next.insert("prompt".to_string(), prompt.clone());
        }
        if let Some(duration) = fields.get("duration") {
            if fields.contains_key("videoUrl") {
                next.insert("videoDuration".to_string(), duration.clone());
            }
        }
    }
    Value::Object(next)
}

/// A background run; `run` tells a run apart from a later one on the same pipeline
struct RunHandle {
    run: u64,
    handle: JoinHandle<()>,
}

/// Pipeline store and runner
#[derive(Clone)]
pub struct PipelineService {
    pipelines: Arc<RwLock<HashMap<String, Pipeline>>>,
    templates: Arc<Vec<PipelineTemplate>>,
    executors: Arc<StepExecutorRegistry>,
    runs: Arc<DashMap<String, RunHandle>>,
    next_run: Arc<AtomicU64>,
}

impl PipelineService {
    pub fn new(templates: Vec<PipelineTemplate>, executors: StepExecutorRegistry) -> Self {
        Self {
            pipelines: Arc::new(RwLock::new(HashMap::new())),
            templates: Arc::new(templates),
            executors: Arc::new(executors),
            runs: Arc::new(DashMap::new()),
            next_run: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Built-in templates, every step served by `gateway`
    pub fn with_gateway(gateway: Arc<ProviderGateway>, step_delay: Duration) -> Self {
        Self::new(
            builtin_templates(),
            StepExecutorRegistry::with_gateway(gateway, step_delay),
        )
    }

    pub fn templates(&self) -> Vec<PipelineTemplate> {
        self.templates.as_ref().clone()
    }

    /// Create a draft pipeline; an unknown template yields no steps
    pub async fn create(&self, request: CreatePipelineRequest) -> Pipeline {
        let steps = request
            .template_id
            .as_deref()
            .and_then(|id| self.templates.iter().find(|t| t.id == id))
            .map(|template| {
                template
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(i, step_type)| PipelineStep::new(i, step_type.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        let now = Utc::now();
        let pipeline = Pipeline {
            id: pipeline_id(),
            title: request
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "New Workflow".to_string()),
            description: request.description,
            steps,
            status: PipelineStatus::Draft,
            created_at: now,
            updated_at: now,
        };

        self.pipelines
            .write()
            .await
            .insert(pipeline.id.clone(), pipeline.clone());
        tracing::info!(
            "Created pipeline {} with {} steps",
            pipeline.id,
            pipeline.steps.len()
        );
        pipeline
    }

    pub async fn get(&self, id: &str) -> HubResult<Pipeline> {
        self.pipelines
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::not_found("Workflow", id))
    }

    /// Every pipeline, oldest first
    pub async fn list(&self) -> Vec<Pipeline> {
        let mut pipelines: Vec<Pipeline> = self.pipelines.read().await.values().cloned().collect();
        pipelines.sort_by_key(|p| p.created_at);
        pipelines
    }

    /// Execute the step whose id or type is `step_ref`
    pub async fn execute_step(
        &self,
        id: &str,
        step_ref: &str,
        input: &Value,
    ) -> HubResult<StepExecution> {
        let (index, executor) = {
            let mut pipelines = self.pipelines.write().await;
            let pipeline = pipelines
                .get_mut(id)
                .ok_or_else(|| HubError::not_found("Workflow", id))?;
            let index = pipeline
                .find_step(step_ref)
                .ok_or_else(|| HubError::validation("Step not found in workflow"))?;
            let executor = self.executors.get(&pipeline.steps[index].step_type)?;

            let step = &mut pipeline.steps[index];
            step.status = StepStatus::Running;
            step.error = None;
            pipeline.updated_at = Utc::now();
            (index, executor)
        };

        let result = executor.execute(input).await;

        let mut pipelines = self.pipelines.write().await;
        let pipeline = pipelines
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("Workflow", id))?;
        pipeline.updated_at = Utc::now();
        let step = pipeline
            .steps
            .get_mut(index)
            .ok_or_else(|| HubError::Internal(format!("step {} vanished", index)))?;

        match result {
            Ok(sourced) => {
                let (output, source, reason) = sourced.into_parts();
                step.status = StepStatus::Completed;
                step.output = Some(output.clone());
                step.source = Some(source);
                let step_id = step.id.clone();

                let next_step = pipeline.steps.get(index + 1).map(|s| s.id.clone());
                let workflow_complete = pipeline.all_completed();
                if workflow_complete {
                    pipeline.status = PipelineStatus::Completed;
                }
                tracing::debug!("Pipeline {} step {} completed", id, step_id);

                Ok(StepExecution {
                    step: step_id,
                    output,
                    source,
                    fallback_reason: reason,
                    next_step,
                    workflow_complete,
                })
            }
            Err(e) => {
                step.status = StepStatus::Failed;
                step.error = Some(e.to_string());
                tracing::warn!("Pipeline {} step {} failed: {}", id, step.id, e);
                Err(e)
            }
        }
    }

    /// Mark the pipeline active and run its remaining steps in the background
    pub async fn run(&self, id: &str, input: Value) -> HubResult<PipelineRunTicket> {
        let mut pipelines = self.pipelines.write().await;
        let pipeline = pipelines
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("Workflow", id))?;
        if self.runs.contains_key(id) {
            return Err(HubError::validation("Workflow is already running"));
        }
        pipeline.status = PipelineStatus::Active;
        pipeline.updated_at = Utc::now();
        let total_steps = pipeline.steps.len();

        // the task waits until its handle is registered
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let service = self.clone();
        let pipeline_id = id.to_string();
        let handle = tokio::spawn(async move {
            if registered_rx.await.is_err() {
                return;
            }
            service.run_remaining(&pipeline_id, input).await;
            service.runs.remove_if(&pipeline_id, |_, entry| entry.run == run);
        });
        self.runs.insert(id.to_string(), RunHandle { run, handle });
        let _ = registered_tx.send(());
        drop(pipelines);

        tracing::info!("Started pipeline run {} ({} steps)", id, total_steps);
        Ok(PipelineRunTicket {
            task_id: format!("wf-task-{}", Utc::now().timestamp_millis()),
            status: "processing".to_string(),
            workflow_id: id.to_string(),
            total_steps,
        })
    }

    /// Number of runs still in flight
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    /// Wait for a background run to finish; returns immediately when none is active
    pub async fn wait_for_run(&self, id: &str) {
        if let Some((_, entry)) = self.runs.remove(id) {
            if let Err(e) = entry.handle.await {
                tracing::error!("Pipeline run {} panicked: {}", id, e);
            }
        }
    }

    async fn run_remaining(&self, id: &str, input: Value) {
        let pending: Vec<(String, Option<Value>)> = match self.get(id).await {
            Ok(pipeline) => pipeline
                .steps
                .iter()
                .map(|s| {
                    let done = (s.status == StepStatus::Completed).then(|| s.output.clone());
                    (s.id.clone(), done.flatten())
                })
                .collect(),
            Err(_) => return,
        };

        let mut current = input;
        for (step_id, completed_output) in pending {
            if let Some(output) = completed_output {
                current = thread_input(&current, &output);
                continue;
            }
            match self.execute_step(id, &step_id, &current).await {
                Ok(execution) => current = thread_input(&current, &execution.output),
                Err(e) => {
                    self.set_status(id, PipelineStatus::Failed).await;
                    tracing::warn!("Pipeline run {} failed at {}: {}", id, step_id, e);
                    return;
                }
            }
        }

        self.set_status(id, PipelineStatus::Completed).await;
        tracing::info!("Pipeline run {} completed", id);
    }

    async fn set_status(&self, id: &str, status: PipelineStatus) {
        if let Some(pipeline) = self.pipelines.write().await.get_mut(id) {
            pipeline.status = status;
            pipeline.updated_at = Utc::now();
        }
    }
}
