use std::path::PathBuf;
use thiserror::Error;

/// Configuration failures. These are the only errors that stop a run, and they always surface
/// before any request is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Unknown environment \"{name}\" (available: {available})")]
    UnknownEnvironment { name: String, available: String },

    #[error("Unknown test profile \"{name}\" (available: {available})")]
    UnknownProfile { name: String, available: String },

    #[error("Invalid URL \"{url}\": {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
