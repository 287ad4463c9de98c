//! Logging service

use crate::models::{LogLevel, StageId};
use tracing_subscriber::EnvFilter;

/// Initialize logging with the specified level.
///
/// `RUST_LOG` takes precedence when set. Calling this more than once is
/// harmless; later calls leave the first subscriber installed.
pub fn init_logging(level: LogLevel) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "creative_hub={level},creative_hub_core={level}",
            level = level.as_str()
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

/// Log a stage lifecycle event for a session
pub fn log_stage_event(session: &str, stage: StageId, event: &str, details: Option<&str>) {
    tracing::info!(
        session = session,
        stage = stage.as_str(),
        event = event,
        details = details.unwrap_or(""),
        "Stage event"
    );
}

/// Log that a live call was replaced by the fallback
pub fn log_provider_fallback(provider: &str, reason: &str) {
    tracing::warn!(
        provider = provider,
        reason = reason,
        "Live provider failed, using fallback"
    );
}

/// Log a result that arrived for a superseded invocation
pub fn log_stale_result(session: &str, stage: StageId, generation: u64) {
    tracing::warn!(
        session = session,
        stage = stage.as_str(),
        generation = generation,
        "Discarding stale stage result"
    );
}

/// Log a system error
pub fn log_error(error: &str, context: Option<&str>) {
    tracing::error!(
        error = error,
        context = context.unwrap_or(""),
        "System error occurred"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_initialization_is_repeatable() {
        assert!(init_logging(LogLevel::Debug).is_ok());
        assert!(init_logging(LogLevel::Info).is_ok());
    }

    #[test]
    fn test_log_functions() {
        let _ = init_logging(LogLevel::Info);

        log_stage_event("session-1", StageId::Story, "started", Some("seed"));
        log_provider_fallback("openai-dalle", "HTTP 500");
        log_stale_result("session-1", StageId::Script, 3);
        log_error("test error", Some("test context"));
    }
}
