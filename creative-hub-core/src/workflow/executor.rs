//! Stage executor trait and the runner that applies the fallback policy

use crate::errors::HubResult;
use crate::models::{StageId, StageOutput};
use crate::providers::{with_fallback, Sourced};
use crate::workflow::cancellation::CancellationToken;
use crate::workflow::session::UpstreamData;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces one stage's output from upstream data
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Name used in logs and fallback reasons
    fn name(&self) -> &str;

    /// Execute `stage`.
    ///
    /// Implementations must return `Cancelled` promptly once `token` fires.
    async fn execute(
        &self,
        stage: StageId,
        input: &UpstreamData,
        token: &CancellationToken,
    ) -> HubResult<StageOutput>;
}

/// Runs a primary executor, optionally backed by a fallback executor
#[derive(Clone)]
pub struct StageRunner {
    primary: Arc<dyn StageExecutor>,
    fallback: Option<Arc<dyn StageExecutor>>,
}

impl StageRunner {
    /// Primary only; results are always tagged live
    pub fn new(primary: Arc<dyn StageExecutor>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    /// Primary first, `fallback` on any non-cancellation failure
    pub fn with_fallback(primary: Arc<dyn StageExecutor>, fallback: Arc<dyn StageExecutor>) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
        }
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    pub async fn run(
        &self,
        stage: StageId,
        input: &UpstreamData,
        token: &CancellationToken,
    ) -> HubResult<Sourced<StageOutput>> {
        let primary = self.primary.execute(stage, input, token);
        match &self.fallback {
            None => primary.await.map(Sourced::Live),
            Some(fallback) => {
                with_fallback(self.primary.name(), Some(primary), || {
                    fallback.execute(stage, input, token)
                })
                .await
            }
        }
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|f| f.name()))
            .finish()
    }
}
