//! Renderer error types.

use thiserror::Error;
use trellis_core::SceneError;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur during rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A scene operation failed.
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Surface allocation or resize error.
    #[error("Surface error: {0}")]
    Surface(String),

    /// Resource loading failed.
    #[error("Failed to load resource: {0}")]
    Resource(String),
}
