//! Shared error types for frame encoding.

/// Error produced when a message cannot be serialized into its wire form.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The payload could not be serialized to JSON.
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}
