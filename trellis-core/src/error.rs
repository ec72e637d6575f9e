//! Error types for scene operations.

use thiserror::Error;

use crate::ElementId;

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Coarse classification of a [`SceneError`], for callers that branch on the
/// kind of failure rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Undefined geometry (empty point set, degenerate matrix).
    Geometry,
    /// A tree mutation was rejected; the tree is unchanged.
    Structural,
    /// A property name or value was rejected.
    Property,
    /// Document encoding or decoding failed.
    Serialization,
    /// An external resource failed to resolve.
    Resource,
    /// Entity draw logic failed.
    Draw,
    /// An async operation was aborted by the caller.
    Cancelled,
}

/// Errors that can occur in scene operations.
#[derive(Debug, Error)]
pub enum SceneError {
    /// Geometry that cannot be computed, such as the bounds of zero points.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A matrix with a zero determinant was inverted.
    #[error("Matrix is not invertible (determinant {determinant})")]
    NonInvertible {
        /// Determinant of the rejected matrix.
        determinant: f64,
    },

    /// Reparenting would make an entity its own ancestor.
    #[error("Adding {child} to {group} would create a cycle")]
    CycleRejected {
        /// The target group.
        group: ElementId,
        /// The entity that was being added.
        child: ElementId,
    },

    /// The entity is not a child of the group.
    #[error("{child} is not a child of {group}")]
    NotAChild {
        /// The group that was asked to remove the child.
        group: ElementId,
        /// The entity that is not a child.
        child: ElementId,
    },

    /// A container operation was requested on a leaf entity.
    #[error("Entity is not a group: {0}")]
    NotAGroup(ElementId),

    /// Entity not found in scene.
    #[error("Element not found: {0}")]
    ElementNotFound(ElementId),

    /// Unrecognized property name in strict mode.
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// A recognized property was given a value of the wrong shape.
    #[error("Invalid value for {property}: {reason}")]
    InvalidValue {
        /// Property name.
        property: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A color string could not be parsed.
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Entity draw logic failed.
    #[error("Draw failed: {0}")]
    Draw(String),

    /// Document serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource loading failed.
    #[error("Failed to load resource {src}: {reason}")]
    ResourceLoad {
        /// Source URI of the resource.
        src: String,
        /// Loader-provided reason.
        reason: String,
    },

    /// Async tree construction was aborted.
    #[error("Operation aborted")]
    Aborted,
}

impl SceneError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGeometry(_) | Self::NonInvertible { .. } => ErrorKind::Geometry,
            Self::CycleRejected { .. }
            | Self::NotAChild { .. }
            | Self::NotAGroup(_)
            | Self::ElementNotFound(_) => ErrorKind::Structural,
            Self::UnknownProperty(_) | Self::InvalidValue { .. } | Self::InvalidColor(_) => {
                ErrorKind::Property
            }
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::ResourceLoad { .. } => ErrorKind::Resource,
            Self::Draw(_) => ErrorKind::Draw,
            Self::Aborted => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn invalid_value(property: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            property: property.to_string(),
            reason: reason.into(),
        }
    }
}
