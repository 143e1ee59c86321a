//! Full-stack build driver
//!
//! Compiles the artifacts a full-stack run exercises:
//! - Native and WebAssembly targets through the platform toolchain
//! - Output confined to a run-scoped directory
//! - Parallel compilation with deterministic result order
//! - Artifact verification (existence, WebAssembly header) and SHA-256 digests

pub mod artifact;
pub mod driver;
pub mod error;

pub use artifact::{check_wasm_header, compute_digest, BuildArtifact};
pub use driver::{BuildConfig, BuildDriver, BUILD_LOG_FILE};
pub use error::{BuildError, BuildResult};

// Re-export target types for convenience
pub use fullstack_config::{TargetKind, TargetSpec};
