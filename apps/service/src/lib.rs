pub mod cli;
pub mod config;
pub mod console;
pub mod monitoring;
pub mod orchestrator;
pub mod store;
