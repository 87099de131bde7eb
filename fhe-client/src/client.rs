//! Encrypt and decrypt request flows against the FHE coprocessor.

use crate::attestation::{attestation_bytes, attestation_hash, Attestation};
use crate::backend::{BackendContext, EncryptBackend};
use crate::config::ClientConfig;
use crate::error::{FheClientError, Result};
use crate::keycache::{cache_file_name, KeyCache, MOCK_SERVER_PK_FILE};
use crate::rpc::{
    encode_hex, CoprocessorRpc, DecryptPayload, HttpCoprocessor, MockCoprocessor, UploadPayload,
};
use crate::signer::{decrypt_digest, encrypt_digest, RequestSigner};
use crate::types::{
    decode_be_value, encode_plaintext, EncodingType, FheType, Handle, PayloadType,
    UnverifiedEncryptData,
};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DECRYPT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_DECRYPT_INTERVAL: Duration = Duration::from_millis(1_000);

/// Bounds for the decrypt polling loop.
#[derive(Debug, Clone)]
pub struct DecryptOptions {
    /// Wall-clock budget measured from the first attempt. At least one full
    /// request/response cycle runs even if the budget is smaller.
    pub timeout: Duration,
    /// Pause between polling attempts.
    pub interval: Duration,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DECRYPT_TIMEOUT,
            interval: DEFAULT_DECRYPT_INTERVAL,
        }
    }
}

/// Advisory on-chain authorization lookup consulted before decrypt polling.
///
/// The coprocessor is the authority on permissions; a negative or failed
/// lookup here is logged and never blocks the request.
#[async_trait]
pub trait AclPrecheck: Send + Sync {
    async fn is_allowed(&self, handle: &Handle, account: Address) -> anyhow::Result<bool>;
}

/// Client for the coprocessor encrypt/decrypt protocol.
pub struct FheClient {
    config: ClientConfig,
    backends: BackendContext,
    rpc: Option<Arc<dyn CoprocessorRpc>>,
    key_cache: KeyCache,
    acl: Option<Arc<dyn AclPrecheck>>,
}

impl FheClient {
    pub fn new(config: ClientConfig) -> Self {
        let rpc: Option<Arc<dyn CoprocessorRpc>> = if config.mock {
            Some(Arc::new(MockCoprocessor))
        } else {
            config
                .coprocessor_url
                .as_ref()
                .map(|url| Arc::new(HttpCoprocessor::new(url.clone())) as Arc<dyn CoprocessorRpc>)
        };
        let backends = BackendContext::new(config.backend);
        let key_cache = KeyCache::new(&config.key_dir);
        Self {
            config,
            backends,
            rpc,
            key_cache,
            acl: None,
        }
    }

    /// Replace the transport. Used by tests and embedders.
    pub fn with_rpc(mut self, rpc: Arc<dyn CoprocessorRpc>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Use an already-constructed encryption backend instead of resolving one.
    pub fn with_encrypt_backend(mut self, backend: Arc<dyn EncryptBackend>) -> Self {
        self.backends = BackendContext::with_backend(backend);
        self
    }

    /// Attach the advisory on-chain permission lookup.
    pub fn with_acl_precheck(mut self, acl: Arc<dyn AclPrecheck>) -> Self {
        self.acl = Some(acl);
        self
    }

    fn transport(&self) -> Result<&Arc<dyn CoprocessorRpc>> {
        self.rpc.as_ref().ok_or_else(|| {
            FheClientError::Config(
                "no coprocessor endpoint configured (set coprocessor_url or enable mock mode)"
                    .to_string(),
            )
        })
    }

    /// Resolve the coprocessor encryption public key, fetching and caching it
    /// on first use.
    pub async fn request_public_key(&self) -> Result<Vec<u8>> {
        let file_name = if self.config.mock {
            MOCK_SERVER_PK_FILE.to_string()
        } else {
            let endpoint = self.config.coprocessor_url.as_ref().ok_or_else(|| {
                FheClientError::Config(
                    "no coprocessor endpoint configured and no public key cached".to_string(),
                )
            })?;
            cache_file_name(endpoint)
        };
        self.key_cache
            .load_or_fetch(&file_name, self.transport()?.as_ref())
            .await
    }

    /// Encrypt `value` as `fhe_type` and upload the ciphertext.
    ///
    /// Values wider than the declared type are silently truncated to its
    /// width; range checking is the caller's responsibility.
    pub async fn request_encrypt(
        &self,
        signer: &RequestSigner,
        acl_contract: Address,
        value: U256,
        fhe_type: FheType,
        attestation: Option<&Attestation>,
    ) -> Result<UnverifiedEncryptData> {
        let public_key = self.request_public_key().await?;

        let plaintext = encode_plaintext(value, fhe_type);
        let ciphertext = self.backends.encrypt(&public_key, &plaintext).await?;
        tracing::debug!(
            "encrypted {} plaintext bytes into {} ciphertext bytes",
            plaintext.len(),
            ciphertext.len()
        );

        let att_bytes = attestation_bytes(attestation);
        let att_hash = attestation_hash(&att_bytes);
        let timestamp_ms = unix_timestamp_ms();

        let digest = encrypt_digest(
            &ciphertext,
            fhe_type,
            signer.address(),
            acl_contract,
            att_hash,
            timestamp_ms,
        );
        // aborts before any network call if the signature does not recover
        let signed = signer.sign_digest(digest)?;
        let handle = Handle::from_digest(digest, fhe_type);

        let payload = UploadPayload {
            handle: handle.to_hex(),
            ciphertext: encode_hex(&ciphertext),
            encoding: EncodingType::Hex.wire(),
            user_address: signer.address().to_string(),
            acl_contract_address: acl_contract.to_string(),
            att_bytes_hash: encode_hex(att_hash.as_slice()),
            signature: encode_hex(&signed.signature),
            timestamp: format!("0x{timestamp_ms:016x}"),
        };
        let confirmed = self.transport()?.upload_ciphertext(&payload).await?;
        if confirmed != handle {
            tracing::debug!(
                "coprocessor re-derived handle {confirmed} for client handle {handle}"
            );
        }

        Ok(UnverifiedEncryptData {
            handle: confirmed,
            data_type: PayloadType::Attestation,
            data: att_bytes,
        })
    }

    /// Poll the coprocessor for the plaintext behind `handle`.
    ///
    /// The all-zero handle is the "no value" sentinel and resolves to zero
    /// without touching the network. Results are never cached; every call
    /// re-polls from scratch.
    pub async fn request_decrypt(
        &self,
        signer: &RequestSigner,
        acl_contract: Address,
        fhe_type: FheType,
        handle: &Handle,
        options: &DecryptOptions,
    ) -> Result<U256> {
        if handle.is_zero() {
            return Ok(U256::ZERO);
        }

        if let Some(acl) = &self.acl {
            match acl.is_allowed(handle, signer.address()).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    "{handle} is not marked decryptable for {} on-chain; \
                     the coprocessor has the final say",
                    signer.address()
                ),
                Err(e) => {
                    tracing::warn!("authorization pre-check failed for {handle}: {e}")
                }
            }
        }

        let rpc = self.transport()?;
        let start = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            let elapsed = start.elapsed();
            if attempts > 0 && elapsed >= options.timeout {
                return Err(FheClientError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
            attempts += 1;

            // fresh timestamp and signature on every attempt
            let timestamp_ms = unix_timestamp_ms();
            let digest =
                decrypt_digest(handle, fhe_type, signer.address(), acl_contract, timestamp_ms);
            let signed = signer.sign_digest(digest)?;
            let payload = DecryptPayload {
                handle: handle.to_hex(),
                value_type: format!("0x{:02x}", fhe_type.tag()),
                user_address: signer.address().to_string(),
                acl_contract_address: acl_contract.to_string(),
                signature: encode_hex(&signed.signature),
                timestamp: format!("0x{timestamp_ms:016x}"),
            };

            match rpc.decrypt_handle(&payload).await {
                Ok(value) if !value.is_empty() => {
                    if value.len() > 32 {
                        tracing::warn!(
                            "decrypt reply for {handle} carried {} bytes, retrying",
                            value.len()
                        );
                    } else {
                        let result = decode_be_value(&value);
                        tracing::info!(
                            "decrypt of {handle} succeeded after {attempts} attempt(s) \
                             in {}ms",
                            start.elapsed().as_millis()
                        );
                        return Ok(result);
                    }
                }
                Ok(_) => {
                    tracing::debug!(
                        "decrypt result for {handle} not yet available (attempt {attempts})"
                    );
                }
                Err(FheClientError::Remote { code: 404, message }) => {
                    tracing::debug!("decrypt of {handle} pending (404: {message})");
                }
                Err(e @ FheClientError::Remote { .. }) => return Err(e),
                Err(FheClientError::Transport(msg)) => {
                    tracing::warn!("decrypt transport failure, will retry: {msg}");
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(options.interval).await;
        }
    }
}

pub(crate) fn unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockCoprocessorRpc;
    use alloy_primitives::address;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ACL: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    fn fast_options() -> DecryptOptions {
        DecryptOptions {
            timeout: Duration::from_millis(2_000),
            interval: Duration::from_millis(1),
        }
    }

    fn client_with(rpc: MockCoprocessorRpc) -> FheClient {
        FheClient::new(ClientConfig::default()).with_rpc(Arc::new(rpc))
    }

    #[tokio::test]
    async fn zero_handle_short_circuits_without_rpc() {
        let mut rpc = MockCoprocessorRpc::new();
        rpc.expect_decrypt_handle().times(0);
        let client = client_with(rpc);
        let signer = RequestSigner::random();

        let value = client
            .request_decrypt(
                &signer,
                ACL,
                FheType::Uint64,
                &Handle::ZERO,
                &fast_options(),
            )
            .await
            .unwrap();
        assert_eq!(value, U256::ZERO);
    }

    #[tokio::test]
    async fn zero_handle_needs_no_endpoint_at_all() {
        // no transport configured; the sentinel must still resolve
        let client = FheClient::new(ClientConfig::default());
        let signer = RequestSigner::random();
        let value = client
            .request_decrypt(
                &signer,
                ACL,
                FheType::Uint64,
                &Handle::ZERO,
                &fast_options(),
            )
            .await
            .unwrap();
        assert_eq!(value, U256::ZERO);
    }

    #[tokio::test]
    async fn pending_404_then_value_takes_n_plus_one_attempts() {
        const PENDING_ROUNDS: usize = 3;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_mock = calls.clone();

        let mut rpc = MockCoprocessorRpc::new();
        rpc.expect_decrypt_handle()
            .times(PENDING_ROUNDS + 1)
            .returning(move |_| {
                let n = calls_in_mock.fetch_add(1, Ordering::SeqCst);
                if n < PENDING_ROUNDS {
                    Err(FheClientError::Remote {
                        code: 404,
                        message: "not yet available".to_string(),
                    })
                } else {
                    let mut value = vec![0u8; 32];
                    value[31] = 42;
                    Ok(value)
                }
            });

        let client = client_with(rpc);
        let signer = RequestSigner::random();
        let handle = Handle::from_digest(alloy_primitives::keccak256(b"ct"), FheType::Uint64);

        let value = client
            .request_decrypt(&signer, ACL, FheType::Uint64, &handle, &fast_options())
            .await
            .unwrap();
        assert_eq!(value, U256::from(42u64));
        assert_eq!(calls.load(Ordering::SeqCst), PENDING_ROUNDS + 1);
    }

    #[tokio::test]
    async fn non_404_remote_error_is_terminal() {
        let mut rpc = MockCoprocessorRpc::new();
        rpc.expect_decrypt_handle().times(1).returning(|_| {
            Err(FheClientError::Remote {
                code: 500,
                message: "internal".to_string(),
            })
        });

        let client = client_with(rpc);
        let signer = RequestSigner::random();
        let handle = Handle::from_digest(alloy_primitives::keccak256(b"ct"), FheType::Uint64);

        let err = client
            .request_decrypt(&signer, ACL, FheType::Uint64, &handle, &fast_options())
            .await
            .err()
            .expect("remote error must propagate");
        match err {
            FheClientError::Remote { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "internal");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_value_counts_as_pending() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_mock = calls.clone();

        let mut rpc = MockCoprocessorRpc::new();
        rpc.expect_decrypt_handle().times(2).returning(move |_| {
            if calls_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Vec::new())
            } else {
                Ok(vec![7u8])
            }
        });

        let client = client_with(rpc);
        let signer = RequestSigner::random();
        let handle = Handle::from_digest(alloy_primitives::keccak256(b"ct"), FheType::Uint8);

        let value = client
            .request_decrypt(&signer, ACL, FheType::Uint8, &handle, &fast_options())
            .await
            .unwrap();
        assert_eq!(value, U256::from(7u8));
    }

    #[tokio::test]
    async fn transport_failures_are_retried_not_fatal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_mock = calls.clone();

        let mut rpc = MockCoprocessorRpc::new();
        rpc.expect_decrypt_handle().times(2).returning(move |_| {
            if calls_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FheClientError::Transport("connection reset".to_string()))
            } else {
                Ok(vec![1u8])
            }
        });

        let client = client_with(rpc);
        let signer = RequestSigner::random();
        let handle = Handle::from_digest(alloy_primitives::keccak256(b"ct"), FheType::Bool);

        let value = client
            .request_decrypt(&signer, ACL, FheType::Bool, &handle, &fast_options())
            .await
            .unwrap();
        assert_eq!(value, U256::from(1u8));
    }

    #[tokio::test]
    async fn timeout_fires_only_after_a_completed_attempt() {
        let mut rpc = MockCoprocessorRpc::new();
        // a zero timeout still guarantees one real attempt
        rpc.expect_decrypt_handle().times(1).returning(|_| {
            Err(FheClientError::Remote {
                code: 404,
                message: "not yet available".to_string(),
            })
        });

        let client = client_with(rpc);
        let signer = RequestSigner::random();
        let handle = Handle::from_digest(alloy_primitives::keccak256(b"ct"), FheType::Uint64);
        let options = DecryptOptions {
            timeout: Duration::ZERO,
            interval: Duration::from_millis(1),
        };

        let err = client
            .request_decrypt(&signer, ACL, FheType::Uint64, &handle, &options)
            .await
            .err()
            .expect("poll must time out");
        assert!(matches!(err, FheClientError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_configuration_error() {
        let client = FheClient::new(ClientConfig::default());
        let signer = RequestSigner::random();
        let handle = Handle::from_digest(alloy_primitives::keccak256(b"ct"), FheType::Uint64);

        let err = client
            .request_decrypt(&signer, ACL, FheType::Uint64, &handle, &fast_options())
            .await
            .err()
            .expect("decrypt without endpoint must fail");
        assert!(matches!(err, FheClientError::Config(_)));

        let err = client.request_public_key().await.err().unwrap();
        assert!(matches!(err, FheClientError::Config(_)));
    }
}
