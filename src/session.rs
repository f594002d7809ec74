//! Per-device session lifecycle.
//!
//! [`SessionManager`] keeps at most one live session per device, keyed by
//! [`DeviceKey`]. Each entry carries its own async lock, held only while the
//! connect/invalidate decision is made, never across an RPC.
//!
//! Session states: `Absent -> (connect succeeds) -> Live -> (transport failure) -> Absent`.

mod dialer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::device::{Device, DeviceKey};
use crate::routeros::{ApiError, Session};

pub use dialer::{DEFAULT_DIAL_TIMEOUT, Dialer, TcpDialer, TlsSetupError, load_tls_config};

/// Failure to obtain a session for a device.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out dialing {address} after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("TLS handshake with {address} failed: {source}")]
    Tls {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS server name '{0}'")]
    ServerName(String),

    #[error("login to {address} failed: {source}")]
    Auth {
        address: String,
        #[source]
        source: ApiError,
    },
}

type Slot = Arc<tokio::sync::Mutex<Option<Session>>>;

/// Session cache with lazy dial and explicit invalidation.
pub struct SessionManager {
    dialer: Arc<dyn Dialer>,
    slots: Mutex<HashMap<DeviceKey, Slot>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field(
                "devices",
                &self
                    .slots
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager dialing through `dialer`.
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, device: &Device) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(device.key()).or_default())
    }

    /// Return the cached session, or dial and log in to create one.
    ///
    /// A cached session is returned without any I/O. Failures are not retried.
    pub async fn connect(&self, device: &Device) -> Result<Session, ConnectError> {
        let slot = self.slot(device);
        let mut cached = slot.lock().await;

        if let Some(session) = cached.as_ref() {
            return Ok(Arc::clone(session));
        }

        let session = self.dialer.dial(device).await?;
        tracing::debug!(device = %device.name, key = %device.key(), "Session established");
        *cached = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Drop the cached session so the next [`connect`](Self::connect) redials.
    pub async fn invalidate(&self, device: &Device) {
        let slot = self.slot(device);
        if slot.lock().await.take().is_some() {
            tracing::info!(device = %device.name, key = %device.key(), "Session invalidated");
        }
    }

    /// Whether a session is currently cached for `device`.
    pub async fn is_live(&self, device: &Device) -> bool {
        self.slot(device).lock().await.is_some()
    }
}
