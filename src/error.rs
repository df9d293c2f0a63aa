//! Typed errors for the seams callers branch on.
//!
//! Startup and plumbing code uses `anyhow`; these enums exist where a caller
//! has to tell failures apart (per-request recovery, client retry policy).

use std::path::PathBuf;
use thiserror::Error;

/// Label file could not be opened or read.
#[derive(Error, Debug)]
#[error("failed to load labels from {path}: {source}")]
pub struct LabelLoadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Per-request detector failures. Both are recovered into an error response.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Client-side failures of one detection round trip.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("timed out talking to {addr}")]
    Timeout { addr: String },

    #[error("connection refused by {addr}")]
    ConnectionRefused { addr: String },

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("network error: {0}")]
    Other(String),
}

impl NetworkError {
    /// Classify an I/O error raised while talking to `addr`.
    pub fn from_io(err: std::io::Error, addr: &str) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => NetworkError::Timeout {
                addr: addr.to_string(),
            },
            ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused {
                addr: addr.to_string(),
            },
            _ => NetworkError::Other(format!("{addr}: {err}")),
        }
    }

    pub fn kind(&self) -> NetworkErrorKind {
        match self {
            NetworkError::Timeout { .. } => NetworkErrorKind::Timeout,
            NetworkError::ConnectionRefused { .. } => NetworkErrorKind::ConnectionRefused,
            NetworkError::Protocol(_) => NetworkErrorKind::Protocol,
            NetworkError::Other(_) => NetworkErrorKind::Other,
        }
    }
}

/// Classification of a [`NetworkError`], used for retry pacing and log tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    Timeout,
    ConnectionRefused,
    Protocol,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::ConnectionRefused => "connection_refused",
            NetworkErrorKind::Protocol => "protocol_error",
            NetworkErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speech synthesis failures. Only ever logged inside the speech job.
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("speech engine failed: {0}")]
    Engine(String),

    #[error("speech cancelled")]
    Cancelled,

    #[error("speech io error: {0}")]
    Io(#[from] std::io::Error),
}
