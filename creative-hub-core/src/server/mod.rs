pub mod api;
pub mod mock_backend;
pub mod server;
pub mod state;

pub use api::{create_api_routes, ApiEnvelope};
pub use server::HubServer;
pub use state::AppState;
