//! Error types shared by every Sluice crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NluError {
    /// A plugin or filter was constructed with settings it cannot honour.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown destination '{path}'")]
    InvalidDestination { path: String },

    #[error("plugin '{plugin}' produces {produced} but writes to '{destination}'")]
    DestinationMismatch {
        plugin: String,
        produced: String,
        destination: String,
    },

    #[error("plugin '{plugin}' returned a value but has no destination")]
    MissingDestination { plugin: String },

    /// Turn input did not match any shape the pipeline understands.
    #[error("malformed input: {0}")]
    InputShape(String),

    #[error("reference time {0} is not a valid unix timestamp in milliseconds")]
    InvalidReferenceTime(i64),

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    /// A remote collaborator (such as a parsing service) failed.
    #[error("{service} failed: {reason}")]
    External { service: String, reason: String },

    #[error("plugin '{plugin}' grew the training set from {before} to {after} rows")]
    TransformAddedRows {
        plugin: String,
        before: usize,
        after: usize,
    },

    #[error("training failed in '{plugin}': {reason}")]
    Training { plugin: String, reason: String },
}

impl From<serde_json::Error> for NluError {
    fn from(error: serde_json::Error) -> Self {
        NluError::InputShape(error.to_string())
    }
}
