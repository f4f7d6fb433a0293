//! # Runtime Error Types
//!
//! Errors surfaced by the [`crate::Runtime`] API. Render errors caught by a
//! boundary never reach this level.

use std::path::PathBuf;

use canopy_core::{HostError, RenderError, RootId};
use thiserror::Error;

/// Errors returned by runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A render error found no error boundary. The root was unmounted and
    /// marked crashed.
    #[error("uncaught render error in {root}: {source}")]
    UncaughtRender {
        /// Crashed root.
        root: RootId,
        /// The error.
        #[source]
        source: RenderError,
    },

    /// The host adapter failed during commit. The root was marked crashed.
    #[error("commit of {root} failed: {source}")]
    Commit {
        /// Crashed root.
        root: RootId,
        /// Adapter failure.
        #[source]
        source: HostError,
    },

    /// External stores kept changing between render and commit.
    #[error("store snapshots of {root} changed during {attempts} consecutive passes")]
    StoreTearingRetryExhausted {
        /// Crashed root.
        root: RootId,
        /// Passes attempted.
        attempts: u32,
    },

    /// The root was never mounted or has been unmounted.
    #[error("unknown root: {0}")]
    UnknownRoot(RootId),

    /// The root crashed earlier and accepts no more work.
    #[error("{0} crashed and accepts no more work")]
    RootCrashed(RootId),

    /// A root's commits kept scheduling more work for the same root.
    #[error("update limit exceeded on {root}: more than {limit} commits without going idle")]
    UpdateLimitExceeded {
        /// Root that kept rendering.
        root: RootId,
        /// Configured limit.
        limit: u32,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Root the error refers to, if any.
    #[must_use]
    pub fn root(&self) -> Option<RootId> {
        match self {
            Self::UncaughtRender { root, .. }
            | Self::Commit { root, .. }
            | Self::StoreTearingRetryExhausted { root, .. }
            | Self::UpdateLimitExceeded { root, .. }
            | Self::UnknownRoot(root)
            | Self::RootCrashed(root) => Some(*root),
            Self::Config(_) => None,
        }
    }
}

/// Errors raised while loading a [`crate::RuntimeConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}", path = path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML document is malformed or has unknown fields.
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
