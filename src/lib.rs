pub mod api;
pub mod bearer;
pub mod config;
pub mod error;
pub mod extract;
pub mod observability;
pub mod orchestrator;
pub mod state;
pub mod stream;
pub mod transport;
