use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Globally unique 128-bit identifier for a stored object.
///
/// The bytes are kept big-endian so that byte-wise ordering (what a relational
/// backend uses when comparing 16-byte binary columns) and integer ordering
/// (what shard placement uses) agree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 16]);

impl ObjectId {
    /// Width of the on-disk/on-wire encoding.
    pub const LEN: usize = 16;

    /// Create an `ObjectId` from its 16 raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create an `ObjectId` from its integer value.
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    /// Decode from a byte slice, e.g. a `BINARY(16)` column.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The id as an unsigned integer. Used for shard placement.
    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// View the id as a UUID.
    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Hex-encoded string representation (32 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uuid().hyphenated())
    }
}

/// Accepts both hyphenated UUID text and plain hex.
impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self::from)
            .map_err(|e| TypeError::InvalidUuid(e.to_string()))
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

impl From<ObjectId> for Uuid {
    fn from(id: ObjectId) -> Self {
        id.as_uuid()
    }
}

impl From<[u8; 16]> for ObjectId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; 16] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slice_with_wrong_length_is_rejected() {
        let err = ObjectId::from_slice(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn display_is_hyphenated_uuid() {
        let id = ObjectId::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(id.to_string(), "01234567-89ab-cdef-0123-456789abcdef");
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn plain_hex_parses_as_uuid() {
        let id = ObjectId::from_u128(42);
        let parsed: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(ObjectId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("not-an-id".parse::<ObjectId>().is_err());
        assert!(ObjectId::from_hex("zz").is_err());
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(ObjectId::from_u128(7).short_hex().len(), 8);
    }

    proptest! {
        #[test]
        fn byte_order_matches_integer_order(a in any::<u128>(), b in any::<u128>()) {
            let (ia, ib) = (ObjectId::from_u128(a), ObjectId::from_u128(b));
            prop_assert_eq!(ia.cmp(&ib), a.cmp(&b));
            prop_assert_eq!(ia.as_bytes().cmp(ib.as_bytes()), a.cmp(&b));
            prop_assert_eq!(ia.as_u128(), a);
        }
    }
}
