//! Canonical request messages and their secp256k1 signatures.
//!
//! Every signed request is self-verified before it leaves the process: the
//! address recovered from (digest, signature) must equal the declared signer.

use crate::error::{FheClientError, Result};
use crate::types::{FheType, Handle};
use alloy_primitives::{keccak256, Address, B256};
use alloy_signer::{Signer, SignerSync};
use alloy_signer_local::PrivateKeySigner;

/// A digest signed by [`RequestSigner::sign_digest`], already self-verified.
#[derive(Debug, Clone)]
pub struct SignedMessage {
    pub digest: B256,
    /// 65-byte r ‖ s ‖ v signature.
    pub signature: Vec<u8>,
    pub signer: Address,
}

/// Wallet wrapper signing coprocessor requests.
#[derive(Clone)]
pub struct RequestSigner {
    signer: PrivateKeySigner,
}

impl RequestSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Build a signer from a hex-encoded private key, optionally bound to a
    /// chain id.
    pub fn from_hex_key(key: &str, chain_id: Option<u64>) -> Result<Self> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|e| FheClientError::Config(format!("invalid private key: {e}")))?;
        Ok(Self {
            signer: signer.with_chain_id(chain_id),
        })
    }

    /// Fresh random signer, for tests and local experiments.
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a message digest and check that the signature recovers to our own
    /// address before anything is transmitted. A mismatch indicates a local
    /// cryptographic or encoding bug and aborts the request.
    pub fn sign_digest(&self, digest: B256) -> Result<SignedMessage> {
        let signature = self.signer.sign_hash_sync(&digest)?;
        let recovered = signature
            .recover_address_from_prehash(&digest)
            .map_err(|e| {
                FheClientError::SignatureConsistency(format!(
                    "could not recover address from fresh signature: {e}"
                ))
            })?;
        if recovered != self.signer.address() {
            return Err(FheClientError::SignatureConsistency(format!(
                "recovered {recovered}, expected {}",
                self.signer.address()
            )));
        }
        Ok(SignedMessage {
            digest,
            signature: signature.as_bytes().to_vec(),
            signer: recovered,
        })
    }
}

/// Digest of an encrypt request:
/// `keccak256(ciphertext ‖ tag ‖ owner ‖ acl ‖ attHash ‖ timestamp)`.
pub fn encrypt_digest(
    ciphertext: &[u8],
    fhe_type: FheType,
    owner: Address,
    acl_contract: Address,
    att_hash: B256,
    timestamp_ms: u64,
) -> B256 {
    let mut message = Vec::with_capacity(ciphertext.len() + 81);
    message.extend_from_slice(ciphertext);
    message.push(fhe_type.tag());
    message.extend_from_slice(owner.as_slice());
    message.extend_from_slice(acl_contract.as_slice());
    message.extend_from_slice(att_hash.as_slice());
    message.extend_from_slice(&timestamp_ms.to_be_bytes());
    keccak256(&message)
}

/// Digest of a decrypt request:
/// `keccak256(handle ‖ tag ‖ owner ‖ acl ‖ timestamp)`.
pub fn decrypt_digest(
    handle: &Handle,
    fhe_type: FheType,
    owner: Address,
    acl_contract: Address,
    timestamp_ms: u64,
) -> B256 {
    let mut message = Vec::with_capacity(81);
    message.extend_from_slice(handle.as_bytes());
    message.push(fhe_type.tag());
    message.extend_from_slice(owner.as_slice());
    message.extend_from_slice(acl_contract.as_slice());
    message.extend_from_slice(&timestamp_ms.to_be_bytes());
    keccak256(&message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const OWNER: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const ACL: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    #[test]
    fn signatures_recover_to_signer() {
        // the self-verification invariant must hold across generated vectors
        for i in 0..100u64 {
            let signer = RequestSigner::random();
            let digest = keccak256(i.to_be_bytes());
            let signed = signer.sign_digest(digest).unwrap();
            assert_eq!(signed.signer, signer.address());
            assert_eq!(signed.signature.len(), 65);
        }
    }

    #[test]
    fn deterministic_key_signs_stably() {
        use k256::ecdsa::SigningKey;

        let field_bytes: k256::FieldBytes = [0x42u8; 32].into();
        let sk = SigningKey::from_bytes(&field_bytes).unwrap();
        let signer = RequestSigner::new(PrivateKeySigner::from_signing_key(sk));

        let digest = keccak256(b"stable message");
        let first = signer.sign_digest(digest).unwrap();
        let second = signer.sign_digest(digest).unwrap();
        // RFC 6979 nonces make signing deterministic
        assert_eq!(first.signature, second.signature);
        assert_eq!(first.signer, signer.address());
    }

    #[test]
    fn forced_mismatch_is_a_consistency_fault() {
        let signer = RequestSigner::random();
        let digest = keccak256(b"message");
        let signed = signer.sign_digest(digest).unwrap();

        // replaying the signature against a different digest must not recover
        // the signer's address
        let other_digest = keccak256(b"another message");
        let signature =
            alloy_primitives::Signature::try_from(signed.signature.as_slice()).unwrap();
        let recovered = signature.recover_address_from_prehash(&other_digest).ok();
        assert_ne!(recovered, Some(signer.address()));
    }

    #[test]
    fn encrypt_digest_is_deterministic_and_input_sensitive() {
        let ciphertext = vec![7u8; 64];
        let att_hash = keccak256([0xAAu8]);
        let baseline =
            encrypt_digest(&ciphertext, FheType::Uint64, OWNER, ACL, att_hash, 1_000);

        assert_eq!(
            baseline,
            encrypt_digest(&ciphertext, FheType::Uint64, OWNER, ACL, att_hash, 1_000)
        );
        assert_ne!(
            baseline,
            encrypt_digest(&ciphertext, FheType::Uint32, OWNER, ACL, att_hash, 1_000)
        );
        assert_ne!(
            baseline,
            encrypt_digest(&ciphertext, FheType::Uint64, ACL, OWNER, att_hash, 1_000)
        );
        assert_ne!(
            baseline,
            encrypt_digest(&ciphertext, FheType::Uint64, OWNER, ACL, att_hash, 1_001)
        );
        let mut other_ct = ciphertext.clone();
        other_ct[0] ^= 1;
        assert_ne!(
            baseline,
            encrypt_digest(&other_ct, FheType::Uint64, OWNER, ACL, att_hash, 1_000)
        );
    }

    #[test]
    fn decrypt_digest_depends_on_every_field() {
        let handle = Handle::from_digest(keccak256(b"ct"), FheType::Uint64);
        let baseline = decrypt_digest(&handle, FheType::Uint64, OWNER, ACL, 42);

        assert_eq!(
            baseline,
            decrypt_digest(&handle, FheType::Uint64, OWNER, ACL, 42)
        );
        assert_ne!(
            baseline,
            decrypt_digest(&handle, FheType::Uint64, OWNER, ACL, 43)
        );
        let other_handle = Handle::from_digest(keccak256(b"ct2"), FheType::Uint64);
        assert_ne!(
            baseline,
            decrypt_digest(&other_handle, FheType::Uint64, OWNER, ACL, 42)
        );
    }
}
