//! Client helpers for working with a creative hub server (pipeline and session APIs).

pub mod hub_client;

pub use hub_client::{error_kind, ApiError, HubClient, StageInfo};

/// Default server URL used by the CLI
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";
