//! Identifier type and its persisted byte layout.
//!
//! A [`Guid`] is an opaque 128-bit value that names an entity for its whole
//! lifetime, independent of where the entity happens to live in memory.
//! Identifiers are assigned by whoever owns the entity; the registry never
//! generates them.
//!
//! ## Byte layout
//!
//! The persisted form is 16 bytes in the Microsoft GUID layout: the first
//! three fields (`u32`, `u16`, `u16`) little-endian, the trailing eight bytes
//! in order. For `00112233-4455-6677-8899-aabbccddeeff` that is:
//!
//! ```text
//! 33 22 11 00 55 44 77 66 88 99 aa bb cc dd ee ff
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GuidError;

/// Number of bytes in the persisted form of a [`Guid`].
pub const GUID_LEN: usize = 16;

/// A 128-bit entity identifier.
///
/// Unique by convention only. Two entities claiming the same identifier at
/// once is a collision, detected by the registry but never prevented here.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Guid(Uuid);

impl Guid {
    /// The zero identifier. Malformed persisted bytes decode to this.
    pub const NIL: Guid = Guid(Uuid::nil());

    /// Generates a fresh random (v4) identifier.
    ///
    /// Meant for identifier sources, e.g. an entity reassigning itself after
    /// a collision.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns `true` for the zero identifier.
    #[must_use]
    pub fn is_nil(self) -> bool {
        self.0.is_nil()
    }

    /// Encodes the identifier in the persisted 16-byte layout.
    #[must_use]
    pub fn to_bytes_le(self) -> [u8; GUID_LEN] {
        self.0.to_bytes_le()
    }

    /// Decodes an identifier from the persisted 16-byte layout.
    #[must_use]
    pub fn from_bytes_le(bytes: [u8; GUID_LEN]) -> Self {
        Self(Uuid::from_bytes_le(bytes))
    }

    /// Decodes an identifier from a slice that must be exactly
    /// [`GUID_LEN`] bytes long.
    ///
    /// # Errors
    ///
    /// Returns [`GuidError::InvalidLength`] for any other length.
    pub fn try_from_bytes_le(bytes: &[u8]) -> Result<Self, GuidError> {
        let array: [u8; GUID_LEN] = bytes
            .try_into()
            .map_err(|_| GuidError::InvalidLength(bytes.len()))?;
        Ok(Self::from_bytes_le(array))
    }

    /// Decodes an identifier, substituting [`Guid::NIL`] when the input has
    /// the wrong length. Persisted references are read through this.
    #[must_use]
    pub fn from_bytes_lenient(bytes: &[u8]) -> Self {
        Self::try_from_bytes_le(bytes).unwrap_or(Self::NIL)
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entity that carries its own identifier.
///
/// Lets the registry and reference handles derive the identifier from the
/// entity instead of taking it separately.
pub trait Guided {
    /// The identifier currently assigned to this entity.
    fn guid(&self) -> Guid;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "00112233-4455-6677-8899-aabbccddeeff";

    #[test]
    fn test_persisted_layout_is_mixed_endian() {
        let guid: Guid = SAMPLE.parse().unwrap();
        assert_eq!(
            guid.to_bytes_le(),
            [
                0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
                0xee, 0xff
            ]
        );
    }

    #[test]
    fn test_bytes_roundtrip_including_nil() {
        let guid: Guid = SAMPLE.parse().unwrap();
        assert_eq!(Guid::from_bytes_le(guid.to_bytes_le()), guid);
        assert_eq!(Guid::from_bytes_le(Guid::NIL.to_bytes_le()), Guid::NIL);
        assert_eq!(Guid::NIL.to_bytes_le(), [0u8; GUID_LEN]);
    }

    #[test]
    fn test_wrong_length_is_rejected_strictly() {
        let err = Guid::try_from_bytes_le(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, GuidError::InvalidLength(3)));
    }

    #[test]
    fn test_wrong_length_decodes_to_nil_leniently() {
        assert_eq!(Guid::from_bytes_lenient(&[]), Guid::NIL);
        assert_eq!(Guid::from_bytes_lenient(&[7u8; 15]), Guid::NIL);
        assert_eq!(Guid::from_bytes_lenient(&[7u8; 17]), Guid::NIL);
    }

    #[test]
    fn test_display_matches_parse() {
        let guid: Guid = SAMPLE.parse().unwrap();
        assert_eq!(guid.to_string(), SAMPLE);
        assert!("not-a-guid".parse::<Guid>().is_err());
    }

    #[test]
    fn test_random_guids_differ() {
        let a = Guid::new_random();
        let b = Guid::new_random();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn test_guid_serialization_roundtrip() {
        let guid = Guid::new_random();
        let bytes = rmp_serde::to_vec(&guid).unwrap();
        let restored: Guid = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(guid, restored);
    }
}
