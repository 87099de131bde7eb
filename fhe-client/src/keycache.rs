//! Local cache of the coprocessor encryption public key.
//!
//! One file per remote endpoint. The existence check before fetching is
//! optimistic; two processes racing to fetch and overwrite the same file is
//! benign because the content is identical.

use crate::error::Result;
use crate::rpc::CoprocessorRpc;
use std::path::{Path, PathBuf};

/// Cache file used when running against the mock coprocessor.
pub const MOCK_SERVER_PK_FILE: &str = "mock_server_pk.bin";

const SERVER_PK_FILE_PREFIX: &str = "server_pk";

/// Cache file name for a given endpoint. Runs of characters outside
/// `[A-Za-z0-9._-]` collapse to a single `-`.
pub fn cache_file_name(endpoint: &str) -> String {
    let mut safe = String::with_capacity(endpoint.len());
    let mut previous_was_dash = false;
    for c in endpoint.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            safe.push(c);
            previous_was_dash = false;
        } else if !previous_was_dash {
            safe.push('-');
            previous_was_dash = true;
        }
    }
    format!("{SERVER_PK_FILE_PREFIX}-{safe}.bin")
}

/// File-backed public key cache rooted at a configured directory.
pub struct KeyCache {
    dir: PathBuf,
}

impl KeyCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Return the cached key, fetching and persisting it on a cache miss.
    pub async fn load_or_fetch(
        &self,
        file_name: &str,
        rpc: &dyn CoprocessorRpc,
    ) -> Result<Vec<u8>> {
        let path = self.dir.join(file_name);
        if path.exists() {
            tracing::debug!("using cached coprocessor public key at {}", path.display());
            return Ok(tokio::fs::read(&path).await?);
        }

        let public_key = rpc.download_public_key().await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &public_key).await?;
        tracing::info!(
            "cached {} byte coprocessor public key at {}",
            public_key.len(),
            path.display()
        );
        Ok(public_key)
    }
}
