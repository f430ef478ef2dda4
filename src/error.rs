//! Error types for device sessions, job execution and inventory loading.
//!
//! Every failure a collection run can hit is a variant of [`HarvestError`].
//! Per-command read timeouts are not errors: they surface as
//! [`ReadStatus::TimedOut`](crate::session::ReadStatus) and only degrade the
//! transcript.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading the inventory or harvesting a device.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The inventory file is unusable.
    ///
    /// Raised before any job runs; the whole collection is aborted.
    #[error("config error: {0}")]
    Config(String),

    /// The vendor tag is not one of the supported CLI dialects.
    #[error("unknown vendor {0:?} (use huawei or zte)")]
    UnknownVendor(String),

    /// The protocol tag is neither `ssh` nor `telnet`.
    #[error("unknown protocol {0:?} (use ssh or telnet)")]
    UnknownProtocol(String),

    /// The TCP connection or SSH transport could not be established.
    #[error("connect {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// Credentials or host key were rejected, or a login prompt never showed up.
    #[error("auth {addr}: {reason}")]
    Auth { addr: String, reason: String },

    /// The PTY or shell request on an established SSH connection failed.
    #[error("shell setup {addr}: {reason}")]
    Shell { addr: String, reason: String },

    /// Writing a command line to the device failed.
    ///
    /// `index` is the position of the command in the vendor command list.
    #[error("write command #{index} {command:?}: {reason}")]
    Write {
        index: usize,
        command: String,
        reason: String,
    },

    /// The run was cancelled by the operator.
    #[error("cancelled")]
    Cancelled,

    /// Every attempt of a job failed.
    #[error("failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<HarvestError>,
    },

    /// The finished transcript could not be persisted.
    #[error("persist transcript {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error on a local resource.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The inventory file is not valid JSON for the expected layout.
    #[error("parse config: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// Whether another attempt of the same job could succeed.
    ///
    /// Cancellation, unknown vendor/protocol and configuration problems are
    /// properties of the job or the run, not of the device.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HarvestError::Cancelled
                | HarvestError::UnknownVendor(_)
                | HarvestError::UnknownProtocol(_)
                | HarvestError::Config(_)
        )
    }

    /// Whether this error is (or wraps) an operator cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            HarvestError::Cancelled => true,
            HarvestError::RetriesExhausted { last, .. } => last.is_cancelled(),
            _ => false,
        }
    }
}
