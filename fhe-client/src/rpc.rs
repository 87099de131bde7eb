//! JSON-RPC transport to the FHE coprocessor.
//!
//! One HTTP POST per call, JSON-RPC 2.0 envelope, random positive 31-bit
//! request ids. Transport-level failures are retried on a fixed budget;
//! well-formed error replies are surfaced to the caller untouched.

use crate::error::{FheClientError, Result};
use crate::types::Handle;
use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const RPC_RETRIES: usize = 3;
pub const RPC_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Placeholder key served by [`MockCoprocessor::download_public_key`].
pub const MOCK_PUBLIC_KEY: [u8; 4] = [0x12, 0x34, 0x56, 0x78];

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    id: u32,
    params: T,
    method: &'static str,
    jsonrpc: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct JsonRpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Serialize)]
pub struct DownloadPayload {
    pub encoding: String,
}

/// `upload` request body; all byte fields are 0x-prefixed hex.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub handle: String,
    pub ciphertext: String,
    pub encoding: String,
    pub user_address: String,
    pub acl_contract_address: String,
    pub att_bytes_hash: String,
    pub signature: String,
    pub timestamp: String,
}

/// `decrypt` request body; all byte fields are 0x-prefixed hex.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptPayload {
    pub handle: String,
    pub value_type: String,
    pub user_address: String,
    pub acl_contract_address: String,
    pub signature: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct DownloadResult {
    pk: String,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct DecryptResult {
    #[serde(default)]
    value: String,
}

/// The three remote operations of the coprocessor protocol.
///
/// `decrypt_handle` resolves to the raw big-endian value bytes; an empty
/// vector means "no result yet". Remote error replies surface as
/// [`FheClientError::Remote`], transport failures as
/// [`FheClientError::Transport`] after the retry budget is spent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoprocessorRpc: Send + Sync {
    async fn download_public_key(&self) -> Result<Vec<u8>>;
    async fn upload_ciphertext(&self, payload: &UploadPayload) -> Result<Handle>;
    async fn decrypt_handle(&self, payload: &DecryptPayload) -> Result<Vec<u8>>;
}

/// Live HTTP transport.
pub struct HttpCoprocessor {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpCoprocessor {
    pub fn new(endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        operation: &str,
        method: &'static str,
        params: P,
    ) -> Result<JsonRpcResponse<R>> {
        let request = JsonRpcRequest {
            id: rand::thread_rng().gen_range(1..=0x7fffffffu32),
            params,
            method,
            jsonrpc: "2.0",
        };

        let mut last_error = FheClientError::Transport(format!("{operation}: no attempt made"));
        for attempt in 1..=RPC_RETRIES {
            match self.try_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        "{operation} attempt {attempt}/{RPC_RETRIES} against {} failed: {e}",
                        self.endpoint
                    );
                    last_error = e;
                    if attempt < RPC_RETRIES {
                        tokio::time::sleep(RPC_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn try_once<P: Serialize, R: DeserializeOwned>(
        &self,
        request: &JsonRpcRequest<P>,
    ) -> Result<JsonRpcResponse<R>> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| FheClientError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FheClientError::Transport(format!(
                "HTTP status {}",
                response.status()
            )));
        }
        response
            .json::<JsonRpcResponse<R>>()
            .await
            .map_err(|e| FheClientError::Transport(e.to_string()))
    }
}

fn check_remote_error<T>(response: JsonRpcResponse<T>) -> Result<Option<T>> {
    if let Some(err) = response.error {
        return Err(FheClientError::Remote {
            code: err.code,
            message: err.message,
        });
    }
    Ok(response.result)
}

/// Decode a 0x-prefixed hex string; `""`, `"0x"` and `"0x0"` decode to empty.
pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    if stripped.is_empty() || stripped == "0" {
        return Ok(Vec::new());
    }
    Ok(hex::decode(stripped)?)
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[async_trait]
impl CoprocessorRpc for HttpCoprocessor {
    async fn download_public_key(&self) -> Result<Vec<u8>> {
        let params = [DownloadPayload {
            encoding: crate::types::EncodingType::Hex.wire(),
        }];
        let response: JsonRpcResponse<DownloadResult> =
            self.call("DOWNLOAD_PK", "download", params).await?;
        let result = check_remote_error(response)?.ok_or_else(|| {
            FheClientError::Transport("download reply carried no result".to_string())
        })?;
        decode_hex(&result.pk)
    }

    async fn upload_ciphertext(&self, payload: &UploadPayload) -> Result<Handle> {
        let params = [[payload]];
        let response: JsonRpcResponse<Vec<UploadResult>> =
            self.call("UPLOAD_CIPHER", "upload", params).await?;
        let result = check_remote_error(response)?.ok_or_else(|| {
            FheClientError::Transport("upload reply carried no result".to_string())
        })?;
        let entry = result.first().ok_or_else(|| {
            FheClientError::Transport("upload reply carried an empty result".to_string())
        })?;
        Handle::from_hex(&entry.handle)
    }

    async fn decrypt_handle(&self, payload: &DecryptPayload) -> Result<Vec<u8>> {
        let params = [[payload]];
        let response: JsonRpcResponse<Vec<DecryptResult>> =
            self.call("USER_DECRYPT", "decrypt", params).await?;
        match check_remote_error(response)?.and_then(|r| r.into_iter().next()) {
            Some(entry) => decode_hex(&entry.value),
            // a success reply without a value is "not ready yet"
            None => Ok(Vec::new()),
        }
    }
}

/// Local simulation of the coprocessor for integration testing.
pub struct MockCoprocessor;

#[async_trait]
impl CoprocessorRpc for MockCoprocessor {
    async fn download_public_key(&self) -> Result<Vec<u8>> {
        Ok(MOCK_PUBLIC_KEY.to_vec())
    }

    /// Re-derives the identity portion of the handle from the signature, the
    /// way the live service acknowledges uploads.
    async fn upload_ciphertext(&self, payload: &UploadPayload) -> Result<Handle> {
        let signature = decode_hex(&payload.signature)?;
        let mut handle = Handle::from_hex(&payload.handle)?.into_bytes();
        let sig_hash = alloy_primitives::keccak256(&signature);
        let digest =
            alloy_primitives::keccak256([sig_hash.as_slice(), handle.as_slice()].concat());
        handle[..20].copy_from_slice(&digest[..20]);
        Ok(Handle::from(handle))
    }

    /// Always a 32-byte zero value; mock decryption does not round-trip
    /// mock-encrypted ciphertexts.
    async fn decrypt_handle(&self, _payload: &DecryptPayload) -> Result<Vec<u8>> {
        Ok(vec![0u8; 32])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FheType;
    use alloy_primitives::keccak256;

    #[test]
    fn hex_codec_edge_cases() {
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("0x0").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("0x1234").unwrap(), vec![0x12, 0x34]);
        assert_eq!(decode_hex("1234").unwrap(), vec![0x12, 0x34]);
        assert!(decode_hex("0xzz").is_err());
        assert_eq!(encode_hex(&[0xab, 0xcd]), "0xabcd");
    }

    #[test]
    fn upload_payload_serializes_to_wire_field_names() {
        let payload = UploadPayload {
            handle: "0x00".to_string(),
            ciphertext: "0x11".to_string(),
            encoding: "0x01".to_string(),
            user_address: "0xaa".to_string(),
            acl_contract_address: "0xbb".to_string(),
            att_bytes_hash: "0xcc".to_string(),
            signature: "0xdd".to_string(),
            timestamp: "0x00000000000003e8".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        for field in [
            "handle",
            "ciphertext",
            "encoding",
            "userAddress",
            "aclContractAddress",
            "attBytesHash",
            "signature",
            "timestamp",
        ] {
            assert!(json.get(field).is_some(), "missing wire field {field}");
        }
    }

    #[test]
    fn decrypt_payload_serializes_to_wire_field_names() {
        let payload = DecryptPayload {
            handle: "0x00".to_string(),
            value_type: "0x04".to_string(),
            user_address: "0xaa".to_string(),
            acl_contract_address: "0xbb".to_string(),
            signature: "0xdd".to_string(),
            timestamp: "0x00000000000003e8".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("valueType").is_some());
        assert!(json.get("aclContractAddress").is_some());
    }

    #[tokio::test]
    async fn mock_upload_splices_signature_digest_into_handle() {
        let submitted = Handle::from_digest(keccak256(b"request"), FheType::Uint64);
        let signature = vec![0x42u8; 65];
        let payload = UploadPayload {
            handle: submitted.to_hex(),
            ciphertext: "0x11".to_string(),
            encoding: "0x01".to_string(),
            user_address: "0xaa".to_string(),
            acl_contract_address: "0xbb".to_string(),
            att_bytes_hash: "0xcc".to_string(),
            signature: encode_hex(&signature),
            timestamp: "0x00".to_string(),
        };

        let confirmed = MockCoprocessor.upload_ciphertext(&payload).await.unwrap();

        let sig_hash = keccak256(&signature);
        let expected_digest =
            keccak256([sig_hash.as_slice(), submitted.as_bytes().as_slice()].concat());
        assert_eq!(&confirmed.as_bytes()[..20], &expected_digest[..20]);
        // metadata bytes survive untouched
        assert_eq!(&confirmed.as_bytes()[20..], &submitted.as_bytes()[20..]);
        assert_eq!(confirmed.fhe_type(), Some(FheType::Uint64));
    }

    #[tokio::test]
    async fn mock_decrypt_is_always_zero() {
        let payload = DecryptPayload {
            handle: Handle::from_digest(keccak256(b"x"), FheType::Uint8).to_hex(),
            value_type: "0x01".to_string(),
            user_address: "0xaa".to_string(),
            acl_contract_address: "0xbb".to_string(),
            signature: "0xdd".to_string(),
            timestamp: "0x00".to_string(),
        };
        let value = MockCoprocessor.decrypt_handle(&payload).await.unwrap();
        assert_eq!(value, vec![0u8; 32]);
    }

    #[test]
    fn error_replies_surface_verbatim() {
        let response: JsonRpcResponse<Vec<DecryptResult>> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":7,"error":{"code":500,"message":"boom"}}"#,
        )
        .unwrap();
        match check_remote_error(response) {
            Err(FheClientError::Remote { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }
}
