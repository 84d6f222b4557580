//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Body is not a well-formed message object
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload of a typed message could not be interpreted
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Message kind whose payload was rejected
        kind: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Echo payload is not a finite decimal timestamp
    #[error("invalid echo timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// Required addressing field is empty
    #[error("missing field: {0}")]
    MissingField(&'static str),
}
