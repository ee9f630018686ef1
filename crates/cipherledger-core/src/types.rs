//! Strong type definitions for CipherLedger.
//!
//! All identifiers are newtypes to prevent misuse at compile time. A
//! `HandleRef` can never be passed where an `Identity` is expected, even
//! though both are 32 opaque bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Ed25519PublicKey;

/// Shared plumbing for the 32-byte identifier newtypes.
macro_rules! bytes32_id {
    ($name:ident, $debug:literal) => {
        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                if bytes.len() != 32 {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }

            /// Whether every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// All-zero sentinel.
            pub const ZERO: Self = Self([0u8; 32]);
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $debug, &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; 32] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

/// An authenticated principal: a record owner, the administrator, or the
/// ledger itself.
///
/// The ledger trusts the caller identity it is handed; authentication
/// happens at the host boundary. [`Identity::ZERO`] is the null identity
/// and is never a valid admin target.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(pub [u8; 32]);

bytes32_id!(Identity, "Identity");

impl From<Ed25519PublicKey> for Identity {
    fn from(pk: Ed25519PublicKey) -> Self {
        Self(pk.0)
    }
}

/// Opaque 256-bit reference to a ciphertext held by the backend.
///
/// Disclosing a reference never discloses plaintext, and holding one
/// grants no decrypt capability.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleRef(pub [u8; 32]);

bytes32_id!(HandleRef, "HandleRef");

/// A 32-byte event identifier, computed as Blake3(canonical_event_bytes(event)).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub [u8; 32]);

bytes32_id!(EventId, "EventId");

/// Owner-scoped record identifier.
///
/// Chosen by the owner. No contiguity or ordering is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Create a new record id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Semantic bit-width of a ciphertext.
///
/// Discriminants follow the coprocessor type codes, which are also the
/// byte embedded in encoded external handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Width {
    U8 = 2,
    U16 = 3,
    U32 = 4,
    U64 = 5,
}

impl Width {
    /// Type code used on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Try to parse from a type code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(Self::U8),
            3 => Some(Self::U16),
            4 => Some(Self::U32),
            5 => Some(Self::U64),
            _ => None,
        }
    }

    /// Number of plaintext bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::U32 => 32,
            Self::U64 => 64,
        }
    }

    /// Largest plaintext representable at this width.
    pub fn max_value(self) -> u64 {
        match self {
            Self::U64 => u64::MAX,
            other => (1u64 << other.bits()) - 1,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "euint{}", self.bits())
    }
}
