//! Shared state injected into every request handler

use crate::models::{Configuration, ExecutorSettings};
use crate::providers::ProviderGateway;
use crate::workflow::{load_templates, PipelineService, StepExecutorRegistry, WorkflowOrchestrator};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Stores and services owned by one server instance
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: WorkflowOrchestrator,
    pub pipelines: PipelineService,
    pub gateway: Arc<ProviderGateway>,
    pub config: Arc<Configuration>,
}

impl AppState {
    pub fn new(
        orchestrator: WorkflowOrchestrator,
        pipelines: PipelineService,
        gateway: Arc<ProviderGateway>,
        config: Configuration,
    ) -> Self {
        Self {
            orchestrator,
            pipelines,
            gateway,
            config: Arc::new(config),
        }
    }

    /// Build every service from configuration
    pub fn from_config(config: Configuration) -> Result<Self> {
        let gateway = Arc::new(ProviderGateway::from_config(&config));
        let templates = load_templates(config.templates_path.as_deref())
            .context("Failed to load pipeline templates")?;
        let executors = StepExecutorRegistry::with_gateway(
            Arc::clone(&gateway),
            Duration::from_millis(config.executor.step_delay_ms),
        );
        let pipelines = PipelineService::new(templates, executors);
        let orchestrator = WorkflowOrchestrator::simulated(&config.executor);

        Ok(Self::new(orchestrator, pipelines, gateway, config))
    }

    /// No delays and no live providers
    pub fn instant() -> Self {
        let config = Configuration {
            executor: ExecutorSettings::instant(),
            ..Configuration::default()
        };
        let gateway = Arc::new(ProviderGateway::mock_only());
        let pipelines = PipelineService::with_gateway(Arc::clone(&gateway), Duration::ZERO);
        let orchestrator = WorkflowOrchestrator::simulated(&config.executor);
        Self::new(orchestrator, pipelines, gateway, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let state = AppState::from_config(Configuration::default()).unwrap();
        assert_eq!(state.pipelines.templates().len(), 3);
        assert!(state.orchestrator.is_empty());
    }

    #[test]
    fn test_missing_templates_file_fails() {
        let config = Configuration {
            templates_path: Some("/nonexistent/creative-hub/templates.yaml".into()),
            ..Configuration::default()
        };
        assert!(AppState::from_config(config).is_err());
    }
}
