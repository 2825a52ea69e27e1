//! Error and diagnostic types.

use std::fmt;

use crate::guid::Guid;

/// Errors from decoding or parsing identifiers.
#[derive(Debug, thiserror::Error)]
pub enum GuidError {
    /// Persisted identifier bytes had the wrong length.
    #[error("expected 16 identifier bytes, got {0}")]
    InvalidLength(usize),

    /// Identifier text was not a valid GUID.
    #[error("invalid identifier text: {0}")]
    Parse(#[from] uuid::Error),
}

/// How loudly a collision is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Two live entities share an identifier while running. A data or
    /// programming error that must not pass silently.
    Assertion,
    /// A duplicate produced while authoring, typically by copying an entity.
    /// Expected, and repaired by the caller assigning a new identifier.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assertion => f.write_str("assertion"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A registration rejected because a different live entity already holds
/// the identifier. The existing binding is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("guid collision on {guid} ({severity})")]
pub struct Collision {
    /// The contested identifier.
    pub guid: Guid,
    /// Severity chosen from the registry's execution mode.
    pub severity: Severity,
}

/// Errors from using a reference handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    /// The handle was disposed and has no subscription to resolve through.
    #[error("reference to {0} used after dispose")]
    Disposed(Guid),
}
