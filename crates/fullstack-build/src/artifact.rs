//! Built artifacts and their verification

use crate::error::{BuildError, BuildResult};
use fullstack_config::TargetKind;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// WebAssembly binary magic (`\0asm`) followed by format version 1
const WASM_HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// A verified build output, read-only once produced
#[derive(Debug, Clone, Serialize)]
pub struct BuildArtifact {
    /// Artifact identifier (the target name)
    pub id: String,
    /// Target kind
    pub kind: TargetKind,
    /// Platform the artifact was built for
    pub platform: String,
    /// Location of the artifact
    pub path: PathBuf,
    /// Location of the saved build log
    pub log_path: PathBuf,
    /// Captured toolchain output
    #[serde(skip)]
    pub log: String,
    /// SHA-256 of the artifact, hex encoded
    pub digest: String,
    /// Size in bytes
    pub size: u64,
    /// Toolchain wall-clock time
    #[serde(skip)]
    pub build_time: Duration,
}

impl BuildArtifact {
    /// Short digest for display
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

/// Hex-encoded SHA-256 of a byte slice
pub fn compute_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Check the WebAssembly binary header
pub fn check_wasm_header(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < WASM_HEADER.len() {
        return Err(format!("file is {} bytes, too short for a module", bytes.len()));
    }
    if bytes[..4] != WASM_HEADER[..4] {
        return Err("missing \\0asm magic".to_string());
    }
    if bytes[4..8] != WASM_HEADER[4..8] {
        return Err("unsupported binary format version".to_string());
    }
    Ok(())
}

/// Read and verify an artifact, returning its digest and size
pub(crate) fn inspect(target: &str, kind: TargetKind, path: &Path) -> BuildResult<(String, u64)> {
    let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;

    if kind == TargetKind::Wasm {
        check_wasm_header(&bytes).map_err(|reason| BuildError::InvalidArtifact {
            target: target.to_string(),
            path: path.to_path_buf(),
            reason,
        })?;
    }

    Ok((compute_digest(&bytes), bytes.len() as u64))
}
