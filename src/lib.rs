pub mod assets;
pub mod config;
pub mod encoding;
pub mod error;
pub mod gemini;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod store;
