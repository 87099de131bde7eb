//! Attestation payloads accompanying encryption requests.
//!
//! The byte layout is a fixed ABI tuple shared with the coprocessor; any
//! change to field order or types breaks hash equality with the service.

use alloy_primitives::{keccak256, Address, B256};
use alloy_sol_types::{sol, SolValue};

/// Single-byte placeholder used when no attestation accompanies a request.
pub const ATTESTATION_SENTINEL: u8 = 0xAA;

sol! {
    struct SolAttRequest {
        string url;
        string header;
        string method;
        string body;
    }

    struct SolResponseResolve {
        string keyName;
        string parseType;
        string parsePath;
    }

    struct SolAttestor {
        address attestorAddr;
        string url;
    }

    struct SolAttestation {
        address recipient;
        SolAttRequest request;
        SolResponseResolve[] responseResolve;
        string data;
        string attConditions;
        uint64 timestamp;
        string additionParams;
        SolAttestor[] attestors;
        bytes[] signatures;
    }
}

/// Request descriptor embedded in an attestation.
#[derive(Debug, Clone, Default)]
pub struct AttestationRequest {
    pub url: String,
    pub header: String,
    pub method: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseResolve {
    pub key_name: String,
    pub parse_type: String,
    pub parse_path: String,
}

#[derive(Debug, Clone)]
pub struct Attestor {
    pub attestor_addr: Address,
    pub url: String,
}

/// Structured proof payload bound into the signed encrypt message.
#[derive(Debug, Clone)]
pub struct Attestation {
    pub recipient: Address,
    pub request: AttestationRequest,
    pub response_resolve: Vec<ResponseResolve>,
    pub data: String,
    pub att_conditions: String,
    pub timestamp: u64,
    pub addition_params: String,
    pub attestors: Vec<Attestor>,
    pub signatures: Vec<Vec<u8>>,
}

/// ABI-encode an attestation into its canonical byte form.
pub fn encode_attestation(att: &Attestation) -> Vec<u8> {
    let sol = SolAttestation {
        recipient: att.recipient,
        request: SolAttRequest {
            url: att.request.url.clone(),
            header: att.request.header.clone(),
            method: att.request.method.clone(),
            body: att.request.body.clone(),
        },
        responseResolve: att
            .response_resolve
            .iter()
            .map(|r| SolResponseResolve {
                keyName: r.key_name.clone(),
                parseType: r.parse_type.clone(),
                parsePath: r.parse_path.clone(),
            })
            .collect(),
        data: att.data.clone(),
        attConditions: att.att_conditions.clone(),
        timestamp: att.timestamp,
        additionParams: att.addition_params.clone(),
        attestors: att
            .attestors
            .iter()
            .map(|a| SolAttestor {
                attestorAddr: a.attestor_addr,
                url: a.url.clone(),
            })
            .collect(),
        signatures: att
            .signatures
            .iter()
            .map(|s| s.clone().into())
            .collect(),
    };
    sol.abi_encode()
}

/// Canonical attestation bytes for a request: the encoded attestation when one
/// is supplied, the sentinel byte otherwise.
pub fn attestation_bytes(att: Option<&Attestation>) -> Vec<u8> {
    match att {
        Some(att) => encode_attestation(att),
        None => vec![ATTESTATION_SENTINEL],
    }
}

/// Hash bound into the signed encrypt message.
pub fn attestation_hash(att_bytes: &[u8]) -> B256 {
    keccak256(att_bytes)
}
