//! Error types for operation effects.
//!
//! Effects return [`OperationResult`]. The engine never lets these cross its
//! public command API: every failure is turned into a
//! [`Diagnostic`](crate::diagnostics::Diagnostic) and the effect is skipped.

use crate::diagnostics::DiagnosticKind;
use crate::id::{LayerId, ObjectId};
use crate::scene::SceneError;

/// Error returned by an operation effect that could not be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationError {
    /// The target layer does not exist (deleted, or never created).
    #[error("layer not found: {0}")]
    LayerNotFound(LayerId),
    /// The target object is not mounted on the scene graph.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),
    /// A serialized object was missing required fields or had the wrong shape.
    #[error("malformed object: {0}")]
    MalformedObject(String),
    /// The model is in a state that does not allow the effect.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The scene graph adapter rejected the change.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl OperationError {
    /// Classifies the error for the diagnostics buffer.
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::LayerNotFound(_) | Self::ObjectNotFound(_) => DiagnosticKind::MissingTarget,
            Self::MalformedObject(_) => DiagnosticKind::MalformedInput,
            Self::InvalidState(_) => DiagnosticKind::InvariantViolation,
            Self::Scene(_) => DiagnosticKind::InvariantViolation,
        }
    }
}

/// Result type for operation effects.
pub type OperationResult<T = ()> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let layer = LayerId::new();
        assert_eq!(
            OperationError::LayerNotFound(layer).to_string(),
            format!("layer not found: {layer}")
        );
        assert_eq!(
            OperationError::MalformedObject("missing geometry".into()).to_string(),
            "malformed object: missing geometry"
        );
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            OperationError::ObjectNotFound(ObjectId::new()).kind(),
            DiagnosticKind::MissingTarget
        );
        assert_eq!(
            OperationError::MalformedObject(String::new()).kind(),
            DiagnosticKind::MalformedInput
        );
        assert_eq!(
            OperationError::InvalidState(String::new()).kind(),
            DiagnosticKind::InvariantViolation
        );
    }
}
