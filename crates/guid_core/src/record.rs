//! Persisted form of a reference.
//!
//! The record is what a persistence layer writes for a
//! [`GuidReference`](crate::GuidReference): the identifier bytes in the
//! layout described in [`guid`](crate::guid), plus an optional label for
//! display in tooling. Labels are never consulted when resolving.

use serde::{Deserialize, Serialize};

use crate::guid::Guid;

/// Human-readable annotation describing what a reference pointed at when it
/// was saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLabel {
    /// Name of the referenced entity.
    pub name: String,
    /// Scene or container the entity lived in, if known.
    #[serde(default)]
    pub scene: Option<String>,
}

impl ReferenceLabel {
    /// Create a label with just a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scene: None,
        }
    }

    /// Attach the scene the entity belongs to.
    #[must_use]
    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = Some(scene.into());
        self
    }
}

/// Serializable reference: identifier bytes and an optional label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Identifier in the 16-byte persisted layout. Missing or malformed
    /// bytes read back as [`Guid::NIL`].
    #[serde(default)]
    pub guid: Vec<u8>,
    /// Display-only annotation.
    #[serde(default)]
    pub label: Option<ReferenceLabel>,
}

impl ReferenceRecord {
    /// Create a record for `guid` without a label.
    #[must_use]
    pub fn new(guid: Guid) -> Self {
        Self {
            guid: guid.to_bytes_le().to_vec(),
            label: None,
        }
    }

    /// The stored identifier, or [`Guid::NIL`] if the bytes are malformed.
    #[must_use]
    pub fn guid(&self) -> Guid {
        Guid::from_bytes_lenient(&self.guid)
    }
}
