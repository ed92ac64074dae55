pub mod orchestrator;
pub mod prompt;
pub mod provider;
