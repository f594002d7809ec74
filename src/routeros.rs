//! RouterOS API client.
//!
//! The exporter talks to devices through the [`ApiClient`] trait; [`Client`]
//! is the TCP/TLS implementation speaking the RouterOS API sentence protocol.
//!
//! - [`proto`]: word and sentence framing
//! - [`Client`]: command execution and login over one stream

mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod proto;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

pub use client::{Client, Transport};

/// One reply record: attribute name to value.
pub type Record = HashMap<String, String>;

/// Errors returned by the RouterOS API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Stream read/write failure.
    #[error("api i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Command was rejected by the device (`!trap`).
    #[error("device returned trap: {0}")]
    Trap(String),

    /// Device closed the session (`!fatal`).
    #[error("device returned fatal: {0}")]
    Fatal(String),

    /// Reply did not follow the sentence protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Whether the underlying stream is no longer usable.
    ///
    /// A session that observed such an error must be discarded and redialed.
    /// Any I/O failure mid-command leaves the stream at an unknown sentence
    /// boundary, so every [`ApiError::Io`] counts regardless of its kind.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) | Self::Fatal(_) | Self::Protocol(_) => true,
            Self::Trap(_) => false,
        }
    }
}

/// Result of one command: data records plus the terminal `!done` record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub re: Vec<Record>,
    pub done: Record,
}

impl Reply {
    /// Build a reply from data records only.
    pub fn from_records(re: Vec<Record>) -> Self {
        Self {
            re,
            done: Record::new(),
        }
    }

    /// Build a count-only reply carrying `ret`.
    pub fn from_ret(ret: impl Into<String>) -> Self {
        Self {
            re: Vec::new(),
            done: Record::from([("ret".to_string(), ret.into())]),
        }
    }

    /// The `ret` value of the terminal record, if present and non-empty.
    pub fn ret(&self) -> Option<&str> {
        self.done.get("ret").map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// Command surface of an authenticated device session.
#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    /// Run `command` with raw argument words (`=key=value`, `?query`).
    async fn run(&self, command: &str, args: &[&str]) -> Result<Reply, ApiError>;
}

/// Shared handle to a live, authenticated session.
pub type Session = Arc<dyn ApiClient>;

/// Build a [`Record`] from literal pairs.
pub fn record<const N: usize>(pairs: [(&str, &str); N]) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
