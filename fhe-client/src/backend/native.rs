//! Native encryption backend loaded over FFI.
//!
//! The shared library owns every ciphertext buffer it returns; `free_data`
//! must run exactly once per non-null pointer, on every exit path.

use super::check_ciphertext_len;
use crate::error::{FheClientError, Result};
use libloading::{Library, Symbol};
use std::os::raw::c_int;
use std::path::Path;

/// Fixed relative path the shared library is shipped at.
pub const NATIVE_LIB_PATH: &str = "./native/libfhe-api.so";

/// `encrypt_integer_ex(out_len, pk, pk_len, input, input_len) -> owned ptr`
type EncryptIntegerEx =
    unsafe extern "C" fn(*mut c_int, *const u8, c_int, *const u8, c_int) -> *mut u8;
type FreeData = unsafe extern "C" fn(*mut u8);

pub struct NativeBackend {
    lib: Library,
}

impl NativeBackend {
    /// Load the shared library and probe the required symbols.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(FheClientError::BackendUnavailable(format!(
                "native encryption library not found at {path}"
            )));
        }
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            FheClientError::BackendUnavailable(format!("failed to load {path}: {e}"))
        })?;
        // surface missing symbols at load time rather than on first encrypt
        unsafe {
            lib.get::<EncryptIntegerEx>(b"encrypt_integer_ex")
                .map_err(|e| {
                    FheClientError::BackendUnavailable(format!(
                        "{path} is missing encrypt_integer_ex: {e}"
                    ))
                })?;
            lib.get::<FreeData>(b"free_data").map_err(|e| {
                FheClientError::BackendUnavailable(format!(
                    "{path} is missing free_data: {e}"
                ))
            })?;
        }
        Ok(Self { lib })
    }
}

/// Releases a library-owned buffer exactly once when dropped.
struct ForeignBuf<'lib> {
    ptr: *mut u8,
    free: Symbol<'lib, FreeData>,
}

impl Drop for ForeignBuf<'_> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.free)(self.ptr) };
        }
    }
}

impl super::EncryptBackend for NativeBackend {
    fn encrypt(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let (encrypt, free) = unsafe {
            let encrypt: Symbol<EncryptIntegerEx> = self
                .lib
                .get(b"encrypt_integer_ex")
                .map_err(|e| FheClientError::EncryptionFailed(e.to_string()))?;
            let free: Symbol<FreeData> = self
                .lib
                .get(b"free_data")
                .map_err(|e| FheClientError::EncryptionFailed(e.to_string()))?;
            (encrypt, free)
        };

        let mut out_len: c_int = 0;
        let ptr = unsafe {
            encrypt(
                &mut out_len,
                public_key.as_ptr(),
                public_key.len() as c_int,
                plaintext.as_ptr(),
                plaintext.len() as c_int,
            )
        };
        if ptr.is_null() {
            return Err(FheClientError::EncryptionFailed(
                "backend returned a null ciphertext pointer".to_string(),
            ));
        }
        // released on every path below, success or failure
        let guard = ForeignBuf { ptr, free };

        let len = check_ciphertext_len(out_len as i64)?;
        let ciphertext = unsafe { std::slice::from_raw_parts(guard.ptr, len) }.to_vec();
        Ok(ciphertext)
    }
}
