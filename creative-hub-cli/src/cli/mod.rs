//! CLI command handling

pub mod handlers;
pub mod pipeline;
pub mod pipeline_handlers;
pub mod session;
pub mod session_handlers;
