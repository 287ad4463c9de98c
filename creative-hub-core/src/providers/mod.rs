//! Generation providers and the live → fallback policy
//!
//! Every generation call first goes to the configured live provider for its
//! category. Any failure other than cancellation is retried once against the
//! in-process mock provider and the result is tagged as a fallback, so callers
//! can tell degraded results from live ones.

pub mod gateway;
pub mod http;
pub mod mock;
pub mod registry;
pub mod stream;

pub use gateway::ProviderGateway;
pub use http::HttpProvider;
pub use mock::MockProvider;
pub use registry::{ApiCredential, ProviderRegistry};
pub use stream::{StreamFrame, TextStreamer};

use crate::errors::{HubError, HubResult};
use crate::models::ProviderCategory;
use crate::services::logging::log_provider_fallback;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Fallback reason used when no live provider is configured
pub const NO_ACTIVE_PROVIDER: &str = "no active provider";

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Live,
    Fallback,
}

/// A result tagged with its source
#[derive(Debug, Clone, PartialEq)]
pub enum Sourced<T> {
    Live(T),
    Fallback { value: T, reason: String },
}

impl<T> Sourced<T> {
    pub fn source(&self) -> ResultSource {
        match self {
            Self::Live(_) => ResultSource::Live,
            Self::Fallback { .. } => ResultSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Live(value) | Self::Fallback { value, .. } => value,
        }
    }

    /// Why the fallback was used, `None` for live results
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Live(_) => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Live(value) | Self::Fallback { value, .. } => value,
        }
    }

    pub fn into_parts(self) -> (T, ResultSource, Option<String>) {
        match self {
            Self::Live(value) => (value, ResultSource::Live, None),
            Self::Fallback { value, reason } => (value, ResultSource::Fallback, Some(reason)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        match self {
            Self::Live(value) => Sourced::Live(f(value)),
            Self::Fallback { value, reason } => Sourced::Fallback {
                value: f(value),
                reason,
            },
        }
    }
}

/// One logical generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub category: ProviderCategory,
    /// Step type or `generate` for category-level requests
    pub operation: String,
    pub payload: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(
        category: ProviderCategory,
        operation: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            category,
            operation: operation.into(),
            payload,
        }
    }
}

/// Something that can turn a generation request into a JSON result
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> HubResult<serde_json::Value>;
}

/// Run `live` if present, otherwise or on failure run `fallback`.
///
/// Cancellation from the live attempt is returned as-is. A failing fallback
/// surfaces as `Upstream`, except validation and cancellation errors which
/// keep their kind.
pub async fn with_fallback<T, L, F, Fut>(
    label: &str,
    live: Option<L>,
    fallback: F,
) -> HubResult<Sourced<T>>
where
    L: Future<Output = HubResult<T>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = HubResult<T>>,
{
    let reason = match live {
        None => NO_ACTIVE_PROVIDER.to_string(),
        Some(attempt) => match attempt.await {
            Ok(value) => return Ok(Sourced::Live(value)),
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                let reason = e.to_string();
                log_provider_fallback(label, &reason);
                reason
            }
        },
    };

    match fallback().await {
        Ok(value) => Ok(Sourced::Fallback { value, reason }),
        Err(e) if e.is_cancellation() || matches!(e, HubError::Validation(_)) => Err(e),
        Err(e) => Err(HubError::Upstream(format!(
            "{} (fallback failed: {})",
            reason, e
        ))),
    }
}
