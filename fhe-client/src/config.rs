use crate::backend::BackendMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the FHE client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the coprocessor. Operations that reach the
    /// remote service fail with a configuration error when this is unset
    /// (unless mock mode is on).
    pub coprocessor_url: Option<String>,
    /// Directory holding cached public key files.
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
    /// Which encryption backend to load.
    #[serde(default)]
    pub backend: BackendMode,
    /// Short-circuit all coprocessor calls locally.
    #[serde(default)]
    pub mock: bool,
}

fn default_key_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            coprocessor_url: None,
            key_dir: default_key_dir(),
            backend: BackendMode::default(),
            mock: false,
        }
    }
}
