pub mod configuration;
pub mod debug;
pub mod errors;
pub mod models;
pub mod providers;

pub use errors::{CompletionError, CompletionResult};
pub use providers::factory::{CompletionOptions, Orchestrator};
