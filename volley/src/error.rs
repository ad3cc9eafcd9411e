use crate::payload::PayloadError;
use thiserror::Error;
use volley_core::ConfigError;

/// Errors that prevent a run from starting. Nothing that happens to an individual request ends
/// up here.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Payload setup failed: {0}")]
    Payload(#[from] PayloadError),

    #[error("Invalid test mix: {0}")]
    Mix(#[from] rand::distributions::WeightedError),
}
