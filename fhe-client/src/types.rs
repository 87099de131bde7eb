use crate::error::{FheClientError, Result};
use alloy_primitives::{B256, U256};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// Version byte embedded at position 31 of every handle.
pub const HANDLE_VERSION: u8 = 0;

/// Declared bit-width of an FHE-encrypted integer.
///
/// The numeric tag is part of the wire format (handle byte 30 and the
/// `valueType` field of decrypt requests), so the variant order is a breaking
/// change.
#[derive(
    ValueEnum,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum FheType {
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "uint8")]
    Uint8,
    #[strum(serialize = "uint16")]
    Uint16,
    #[strum(serialize = "uint32")]
    Uint32,
    #[strum(serialize = "uint64")]
    Uint64,
    #[strum(serialize = "uint128")]
    Uint128,
    #[strum(serialize = "uint256")]
    Uint256,
}

impl FheType {
    /// Numeric tag as encoded in handle byte 30.
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Plaintext width in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            FheType::Bool => 1,
            FheType::Uint8 => 1,
            FheType::Uint16 => 2,
            FheType::Uint32 => 4,
            FheType::Uint64 => 8,
            FheType::Uint128 => 16,
            FheType::Uint256 => 32,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FheType::Bool),
            1 => Some(FheType::Uint8),
            2 => Some(FheType::Uint16),
            3 => Some(FheType::Uint32),
            4 => Some(FheType::Uint64),
            5 => Some(FheType::Uint128),
            6 => Some(FheType::Uint256),
            _ => None,
        }
    }
}

/// Wire encoding of ciphertexts and public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingType {
    Hex = 1,
    Base64 = 2,
}

impl EncodingType {
    /// Single-byte hex form used in request payloads, e.g. `"0x01"`.
    pub fn wire(&self) -> String {
        format!("0x{:02x}", *self as u8)
    }
}

/// 32-byte ciphertext identifier.
///
/// Layout: bytes 0..20 carry the leading bytes of the request digest,
/// bytes 20..30 are zero, byte 30 is the [`FheType`] tag and byte 31 the
/// handle format version. The all-zero handle is a reserved "no value"
/// sentinel and is never sent to the coprocessor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle([u8; 32]);

impl Handle {
    pub const LEN: usize = 32;

    pub const ZERO: Handle = Handle([0u8; 32]);

    /// Derive a handle from a request digest, stamping type and version
    /// metadata into the reserved trailing bytes.
    pub fn from_digest(digest: B256, fhe_type: FheType) -> Self {
        let mut bytes: [u8; 32] = digest.0;
        for b in bytes[20..32].iter_mut() {
            *b = 0;
        }
        bytes[30] = fhe_type.tag();
        bytes[31] = HANDLE_VERSION;
        Handle(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        if bytes.len() != Self::LEN {
            return Err(FheClientError::InvalidHandle(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Handle(out))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Ciphertext type encoded at byte 30, if the tag is known.
    pub fn fhe_type(&self) -> Option<FheType> {
        FheType::from_tag(self.0[30])
    }

    pub fn version(&self) -> u8 {
        self.0[31]
    }
}

impl From<[u8; 32]> for Handle {
    fn from(bytes: [u8; 32]) -> Self {
        Handle(bytes)
    }
}

impl From<B256> for Handle {
    fn from(bytes: B256) -> Self {
        Handle(bytes.0)
    }
}

impl From<Handle> for B256 {
    fn from(handle: Handle) -> Self {
        B256::from(handle.0)
    }
}

impl FromStr for Handle {
    type Err = FheClientError;

    fn from_str(s: &str) -> Result<Self> {
        Handle::from_hex(s)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.to_hex())
    }
}

/// Kind of proof material returned alongside an uploaded ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Attestation,
    Proof,
}

/// Result of a successful encrypt-and-upload round trip.
///
/// "Unverified" because the attached attestation payload is not independently
/// checked client-side.
#[derive(Debug, Clone)]
pub struct UnverifiedEncryptData {
    /// Server-confirmed handle; authoritative over the client-computed one.
    pub handle: Handle,
    pub data_type: PayloadType,
    pub data: Vec<u8>,
}

/// Big-endian encode `value` into the trailing `byte_len` bytes of its
/// 32-byte representation.
///
/// Values wider than the declared type are silently truncated; range checking
/// is the caller's responsibility.
pub fn encode_plaintext(value: U256, fhe_type: FheType) -> Vec<u8> {
    let be = value.to_be_bytes::<32>();
    be[32 - fhe_type.byte_len()..].to_vec()
}

/// Decode a big-endian byte sequence (at most 32 bytes significant) into an
/// integer. Empty input decodes to zero.
pub fn decode_be_value(bytes: &[u8]) -> U256 {
    let significant = if bytes.len() > 32 {
        &bytes[bytes.len() - 32..]
    } else {
        bytes
    };
    U256::from_be_slice(significant)
}
