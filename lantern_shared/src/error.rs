//! Typed errors for inbound session events.
//!
//! A `ValidationError` always means "drop this one event". It never closes
//! the session and never reaches the simulation.

/// Why an inbound event was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("non-finite value in field `{field}`")]
    NonFinite { field: &'static str },
    #[error("empty chat message")]
    EmptyChat,
}
