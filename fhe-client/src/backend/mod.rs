//! Encryption backend selection.
//!
//! Two interchangeable backends produce ciphertexts from (public key,
//! plaintext): a native shared library reached over FFI and an in-process
//! wasm module. Selection is resolved lazily, once per context, and reused
//! for the lifetime of the process.

mod native;
mod wasm;

pub use native::{NativeBackend, NATIVE_LIB_PATH};
pub use wasm::{WasmBackend, WASM_INIT_DEADLINE, WASM_MODULE_PATH};

use crate::error::{FheClientError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Sanity bound on backend-reported ciphertext lengths. Anything larger is
/// treated as a corrupted length report, not a legitimate ciphertext.
pub const MAX_CIPHERTEXT_LEN: usize = 100_000_000;

/// Produces a ciphertext from a public key and a plaintext byte sequence.
///
/// The cryptography behind this call is a black box; implementations only
/// guarantee the call contract and buffer hygiene.
pub trait EncryptBackend: Send + Sync {
    fn encrypt(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
}

/// Which backend to load.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Native where the platform supports it, wasm otherwise.
    #[default]
    Auto,
    Native,
    Wasm,
}

/// Process-scoped backend cache with initialize-once semantics.
///
/// Concurrent first use resolves the backend exactly once; later calls reuse
/// the cached instance.
pub struct BackendContext {
    mode: BackendMode,
    cell: OnceCell<Arc<dyn EncryptBackend>>,
}

impl BackendContext {
    pub fn new(mode: BackendMode) -> Self {
        Self {
            mode,
            cell: OnceCell::new(),
        }
    }

    /// Context pre-seeded with an already-constructed backend. Used by tests
    /// and embedders that manage backend lifetime themselves.
    pub fn with_backend(backend: Arc<dyn EncryptBackend>) -> Self {
        Self {
            mode: BackendMode::Auto,
            cell: OnceCell::new_with(Some(backend)),
        }
    }

    pub async fn backend(&self) -> Result<&Arc<dyn EncryptBackend>> {
        self.cell
            .get_or_try_init(|| resolve_backend(self.mode))
            .await
    }

    pub async fn encrypt(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.backend().await?.encrypt(public_key, plaintext)
    }
}

async fn resolve_backend(mode: BackendMode) -> Result<Arc<dyn EncryptBackend>> {
    match mode {
        BackendMode::Native => {
            let backend = NativeBackend::load(NATIVE_LIB_PATH)?;
            tracing::info!("using native encryption backend from {NATIVE_LIB_PATH}");
            Ok(Arc::new(backend))
        }
        BackendMode::Wasm => {
            let backend = WasmBackend::load(WASM_MODULE_PATH).await?;
            tracing::info!("using wasm encryption backend from {WASM_MODULE_PATH}");
            Ok(Arc::new(backend))
        }
        BackendMode::Auto => {
            if prefers_native() {
                match NativeBackend::load(NATIVE_LIB_PATH) {
                    Ok(backend) => {
                        tracing::info!(
                            "using native encryption backend from {NATIVE_LIB_PATH}"
                        );
                        return Ok(Arc::new(backend));
                    }
                    Err(e) => {
                        tracing::warn!(
                            "native encryption backend unavailable ({e}), falling back to wasm"
                        );
                    }
                }
            }
            let backend = WasmBackend::load(WASM_MODULE_PATH).await?;
            tracing::info!("using wasm encryption backend from {WASM_MODULE_PATH}");
            Ok(Arc::new(backend))
        }
    }
}

/// Native builds of the encryption library are distribution-specific; only
/// platforms we ship the shared library for prefer it.
fn prefers_native() -> bool {
    cfg!(target_os = "linux") && os_release_id().as_deref() == Some("ubuntu")
}

fn os_release_id() -> Option<String> {
    let contents = std::fs::read_to_string("/etc/os-release").ok()?;
    parse_os_release_id(&contents)
}

fn parse_os_release_id(contents: &str) -> Option<String> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix("ID="))
        .map(|id| id.trim().trim_matches('"').to_ascii_lowercase())
}

/// Validate a backend-reported ciphertext length before any bytes are read
/// from the source buffer.
pub(crate) fn check_ciphertext_len(reported: i64) -> Result<usize> {
    if reported <= 0 {
        return Err(FheClientError::EncryptionFailed(format!(
            "backend reported a non-positive ciphertext length ({reported})"
        )));
    }
    let len = reported as usize;
    if len > MAX_CIPHERTEXT_LEN {
        return Err(FheClientError::EncryptionFailed(format!(
            "backend reported an implausible ciphertext length ({len} > {MAX_CIPHERTEXT_LEN})"
        )));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    impl EncryptBackend for CountingBackend {
        fn encrypt(&self, _public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(plaintext.to_vec())
        }
    }

    #[test]
    fn length_validation_bounds() {
        assert!(check_ciphertext_len(0).is_err());
        assert!(check_ciphertext_len(-1).is_err());
        assert!(check_ciphertext_len(100_000_001).is_err());
        assert_eq!(check_ciphertext_len(1).unwrap(), 1);
        assert_eq!(check_ciphertext_len(100_000_000).unwrap(), 100_000_000);
    }

    #[test]
    fn length_validation_error_kind() {
        match check_ciphertext_len(-5) {
            Err(FheClientError::EncryptionFailed(_)) => {}
            other => panic!("expected EncryptionFailed, got {other:?}"),
        }
    }

    #[test]
    fn os_release_id_parsing() {
        assert_eq!(
            parse_os_release_id("NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\n"),
            Some("ubuntu".to_string())
        );
        assert_eq!(
            parse_os_release_id("ID=\"Debian\"\n"),
            Some("debian".to_string())
        );
        assert_eq!(parse_os_release_id("NAME=foo\n"), None);
        // VERSION_ID must not be mistaken for ID
        assert_eq!(
            parse_os_release_id("VERSION_ID=\"22.04\"\nID=ubuntu\n"),
            Some("ubuntu".to_string())
        );
    }

    #[tokio::test]
    async fn preseeded_context_skips_resolution() {
        let ctx = BackendContext::with_backend(Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
        }));
        let out = ctx.encrypt(b"pk", b"plaintext").await.unwrap();
        assert_eq!(out, b"plaintext");
    }

    #[tokio::test]
    async fn concurrent_first_use_encrypts_through_one_backend() {
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
        });
        let ctx = Arc::new(BackendContext::with_backend(backend.clone()));

        let a = ctx.clone();
        let b = ctx.clone();
        let (ra, rb) = tokio::join!(a.encrypt(b"pk", b"one"), b.encrypt(b"pk", b"two"));
        assert_eq!(ra.unwrap(), b"one");
        assert_eq!(rb.unwrap(), b"two");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
