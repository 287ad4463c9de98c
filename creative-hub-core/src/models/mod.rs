//! Data models for the creative hub

pub mod configuration;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod stage;

pub use configuration::*;
pub use output::*;
pub use pipeline::*;
pub use provider::*;
pub use stage::*;
