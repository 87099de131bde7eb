//! Portable encryption backend running a wasm-compiled module in-process.
//!
//! Instantiation happens on a dedicated thread; readiness is a one-shot
//! signal awaited under a fixed deadline. A module that never becomes ready
//! within the deadline is reported unavailable and is not retried.

use super::check_ciphertext_len;
use crate::error::{FheClientError, Result};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

/// Fixed relative path the wasm build of the encryption library is shipped at.
pub const WASM_MODULE_PATH: &str = "./wasm/fhe-api.wasm";

/// One-shot deadline for module instantiation.
pub const WASM_INIT_DEADLINE: Duration = Duration::from_millis(5000);

pub struct WasmBackend {
    // wasmtime stores are single-threaded; calls are serialized
    inner: Mutex<WasmInstance>,
}

struct WasmInstance {
    store: Store<()>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    free_data: TypedFunc<i32, ()>,
    encrypt_integer_ex: TypedFunc<(i32, i32, i32, i32, i32), i32>,
}

impl WasmBackend {
    /// Instantiate the module off the async runtime and wait for the ready
    /// signal, bounded by [`WASM_INIT_DEADLINE`].
    pub async fn load(path: &str) -> Result<Self> {
        let path = path.to_string();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let _ = ready_tx.send(WasmInstance::instantiate(&path));
        });

        match tokio::time::timeout(WASM_INIT_DEADLINE, ready_rx).await {
            Ok(Ok(Ok(instance))) => Ok(Self {
                inner: Mutex::new(instance),
            }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(FheClientError::BackendUnavailable(
                "wasm initialization worker exited without signaling readiness".to_string(),
            )),
            Err(_) => Err(FheClientError::BackendUnavailable(format!(
                "wasm module was not ready within {}ms",
                WASM_INIT_DEADLINE.as_millis()
            ))),
        }
    }
}

impl WasmInstance {
    fn instantiate(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(FheClientError::BackendUnavailable(format!(
                "wasm encryption module not found at {path}"
            )));
        }
        let engine = Engine::default();
        let module = Module::from_file(&engine, path).map_err(|e| {
            FheClientError::BackendUnavailable(format!("failed to compile {path}: {e}"))
        })?;
        let mut store = Store::new(&engine, ());
        let linker = Linker::new(&engine);
        let instance: Instance = linker.instantiate(&mut store, &module).map_err(|e| {
            FheClientError::BackendUnavailable(format!("failed to instantiate {path}: {e}"))
        })?;

        let memory = instance.get_memory(&mut store, "memory").ok_or_else(|| {
            FheClientError::BackendUnavailable(format!("{path} exports no linear memory"))
        })?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .map_err(|e| {
                FheClientError::BackendUnavailable(format!("{path} is missing alloc: {e}"))
            })?;
        let free_data = instance
            .get_typed_func::<i32, ()>(&mut store, "free_data")
            .map_err(|e| {
                FheClientError::BackendUnavailable(format!("{path} is missing free_data: {e}"))
            })?;
        let encrypt_integer_ex = instance
            .get_typed_func::<(i32, i32, i32, i32, i32), i32>(&mut store, "encrypt_integer_ex")
            .map_err(|e| {
                FheClientError::BackendUnavailable(format!(
                    "{path} is missing encrypt_integer_ex: {e}"
                ))
            })?;

        Ok(Self {
            store,
            memory,
            alloc,
            free_data,
            encrypt_integer_ex,
        })
    }

    fn encrypt(&mut self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut allocations: Vec<i32> = Vec::with_capacity(4);
        let result = self.encrypt_inner(public_key, plaintext, &mut allocations);
        // guest buffers are released exactly once, on success and on failure
        for ptr in allocations {
            let _ = self.free_data.call(&mut self.store, ptr);
        }
        result
    }

    fn encrypt_inner(
        &mut self,
        public_key: &[u8],
        plaintext: &[u8],
        allocations: &mut Vec<i32>,
    ) -> Result<Vec<u8>> {
        let out_len_ptr = self.alloc_guest(4, allocations)?;
        self.write_guest(out_len_ptr, &[0u8; 4])?;
        let pk_ptr = self.copy_in(public_key, allocations)?;
        let input_ptr = self.copy_in(plaintext, allocations)?;

        let ct_ptr = self
            .encrypt_integer_ex
            .call(
                &mut self.store,
                (
                    out_len_ptr,
                    pk_ptr,
                    public_key.len() as i32,
                    input_ptr,
                    plaintext.len() as i32,
                ),
            )
            .map_err(|e| FheClientError::EncryptionFailed(e.to_string()))?;
        if ct_ptr == 0 {
            return Err(FheClientError::EncryptionFailed(
                "backend returned a null ciphertext pointer".to_string(),
            ));
        }
        allocations.push(ct_ptr);

        let mut len_bytes = [0u8; 4];
        self.memory
            .read(&self.store, out_len_ptr as usize, &mut len_bytes)
            .map_err(|e| FheClientError::EncryptionFailed(e.to_string()))?;
        let len = check_ciphertext_len(i32::from_le_bytes(len_bytes) as i64)?;

        let mut ciphertext = vec![0u8; len];
        self.memory
            .read(&self.store, ct_ptr as usize, &mut ciphertext)
            .map_err(|e| FheClientError::EncryptionFailed(e.to_string()))?;
        Ok(ciphertext)
    }

    fn alloc_guest(&mut self, len: usize, allocations: &mut Vec<i32>) -> Result<i32> {
        let ptr = self
            .alloc
            .call(&mut self.store, len as i32)
            .map_err(|e| FheClientError::EncryptionFailed(e.to_string()))?;
        if ptr == 0 {
            return Err(FheClientError::EncryptionFailed(
                "guest allocation failed".to_string(),
            ));
        }
        allocations.push(ptr);
        Ok(ptr)
    }

    fn copy_in(&mut self, data: &[u8], allocations: &mut Vec<i32>) -> Result<i32> {
        let ptr = self.alloc_guest(data.len().max(1), allocations)?;
        self.write_guest(ptr, data)?;
        Ok(ptr)
    }

    fn write_guest(&mut self, ptr: i32, data: &[u8]) -> Result<()> {
        self.memory
            .write(&mut self.store, ptr as usize, data)
            .map_err(|e| FheClientError::EncryptionFailed(e.to_string()))
    }
}

impl super::EncryptBackend for WasmBackend {
    fn encrypt(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut instance = self.inner.lock().map_err(|_| {
            FheClientError::EncryptionFailed("wasm backend mutex poisoned".to_string())
        })?;
        instance.encrypt(public_key, plaintext)
    }
}
