//! Error types for the baking engine.

use thiserror::Error;

/// Main error type for vertex-gi operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No object with the given name exists in the scene
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Object exists but carries no mesh
    #[error("Object is not a mesh: {0}")]
    NotAMesh(String),

    /// Mesh lacks an attribute the baker needs
    #[error("Mesh {object} has no {attribute} attribute")]
    MissingAttribute { object: String, attribute: &'static str },

    /// Attribute length disagrees with the vertex count
    #[error("Mesh {object}: {attribute} has {actual} entries, expected {expected}")]
    AttributeMismatch {
        object: String,
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Bake configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Render or pixel readback failed
    #[error("Render failed: {0}")]
    Render(String),

    /// No GPU adapter could be found
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a device
    #[error("Device request failed: {0}")]
    DeviceRequest(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a render error from a message.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error describes a scene or config problem that makes the
    /// engine inert, as opposed to a failure the host must handle.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound(_)
                | Self::NotAMesh(_)
                | Self::MissingAttribute { .. }
                | Self::AttributeMismatch { .. }
                | Self::InvalidConfig(_)
        )
    }
}

/// Result type alias for vertex-gi operations.
pub type Result<T> = std::result::Result<T, Error>;
