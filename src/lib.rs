pub mod advisor;
pub mod attachment;
pub mod config;
pub mod crop;
pub mod error;
pub mod gemini;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod routes;
pub mod session;
pub mod studio;
pub mod styles;
pub mod workflow;

#[cfg(test)]
mod testing;
