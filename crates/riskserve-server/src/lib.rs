//! riskserve Server
//!
//! Thin HTTP boundary over the model registry: JSON tables in, uniform
//! prediction responses out. All model semantics live in `riskserve-models`.

pub mod config;
pub mod routes;
pub mod state;

pub use config::{ConfigOverrides, ServerConfig};
pub use routes::create_router;
pub use state::AppState;
