//! Client library for confidential-token FHE coprocessors.
//!
//! Implements the encrypt/decrypt request protocol: backend selection for the
//! encryption primitive, handle construction, signed request assembly with
//! self-verification, a retrying JSON-RPC transport and bounded decrypt
//! polling. On-chain contract interaction stays with the caller; the only
//! chain touchpoint here is the advisory [`AclPrecheck`] seam.

pub mod attestation;
pub mod backend;
mod client;
mod config;
mod error;
mod keycache;
pub mod rpc;
mod signer;
mod types;

pub use crate::backend::{BackendContext, BackendMode, EncryptBackend, MAX_CIPHERTEXT_LEN};
pub use crate::client::{
    AclPrecheck, DecryptOptions, FheClient, DEFAULT_DECRYPT_INTERVAL, DEFAULT_DECRYPT_TIMEOUT,
};
pub use crate::config::ClientConfig;
pub use crate::error::{FheClientError, Result};
pub use crate::keycache::{cache_file_name, KeyCache, MOCK_SERVER_PK_FILE};
pub use crate::rpc::{CoprocessorRpc, HttpCoprocessor, MockCoprocessor};
pub use crate::signer::{decrypt_digest, encrypt_digest, RequestSigner, SignedMessage};
pub use crate::types::{
    decode_be_value, encode_plaintext, EncodingType, FheType, Handle, PayloadType,
    UnverifiedEncryptData, HANDLE_VERSION,
};
