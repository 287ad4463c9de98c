//! # Creative Hub Core Library
//!
//! Shared core functionality for the creative hub: the six-stage creative
//! workflow (story → script → config → character → storyboard → edit), the
//! step pipelines served over HTTP, provider selection with mock fallback,
//! and the API server and client used by the CLI.

pub mod client;
pub mod errors;
pub mod models;
pub mod providers;
pub mod server;
pub mod services;
pub mod workflow;

pub use errors::{ErrorKind, HubError, HubResult};
