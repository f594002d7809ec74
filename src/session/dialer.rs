//! Transport dialing and login.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use super::ConnectError;
use crate::device::{DEFAULT_API_PORT, DEFAULT_API_TLS_PORT, Device};
use crate::routeros::{Client, Session};

/// Default dial timeout (5 seconds).
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens and authenticates a new session to a device.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, device: &Device) -> Result<Session, ConnectError>;
}

/// Dials the RouterOS API over TCP, optionally wrapped in TLS.
///
/// The timeout covers TCP connect and the TLS handshake. Login has no
/// separate timeout.
pub struct TcpDialer {
    timeout: Duration,
    tls: Option<TlsConnector>,
}

impl std::fmt::Debug for TcpDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpDialer")
            .field("timeout", &self.timeout)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl TcpDialer {
    /// Plain TCP dialer (default port 8728).
    pub fn plain(timeout: Duration) -> Self {
        Self { timeout, tls: None }
    }

    /// TLS dialer (default port 8729).
    pub fn tls(timeout: Duration, config: Arc<ClientConfig>) -> Self {
        Self {
            timeout,
            tls: Some(TlsConnector::from(config)),
        }
    }

    fn default_port(&self) -> u16 {
        if self.tls.is_some() {
            DEFAULT_API_TLS_PORT
        } else {
            DEFAULT_API_PORT
        }
    }
}

#[async_trait::async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, device: &Device) -> Result<Session, ConnectError> {
        let port = device.port_or(self.default_port());
        let address = format!("{}:{}", device.address, port);

        tracing::debug!(device = %device.name, address = %address, "Dialing device");
        let stream = timeout(self.timeout, TcpStream::connect((device.address.as_str(), port)))
            .await
            .map_err(|_| ConnectError::Timeout {
                address: address.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| ConnectError::Dial {
                address: address.clone(),
                source,
            })?;

        let client = match &self.tls {
            None => Client::new(stream),
            Some(connector) => {
                let server_name = ServerName::try_from(device.address.clone())
                    .map_err(|_| ConnectError::ServerName(device.address.clone()))?;
                let tls_stream = timeout(self.timeout, connector.connect(server_name, stream))
                    .await
                    .map_err(|_| ConnectError::Timeout {
                        address: address.clone(),
                        timeout: self.timeout,
                    })?
                    .map_err(|source| ConnectError::Tls {
                        address: address.clone(),
                        source,
                    })?;
                Client::new(tls_stream)
            }
        };
        tracing::debug!(device = %device.name, "Connected, logging in");

        client
            .login(&device.user, &device.password)
            .await
            .map_err(|source| ConnectError::Auth {
                address: address.clone(),
                source,
            })?;
        tracing::debug!(device = %device.name, "Login complete");

        Ok(Arc::new(client))
    }
}

/// TLS setup failures.
#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("TLS requires a CA file or insecure mode")]
    MissingCaFile,

    #[error("failed to read CA file: {0}")]
    Io(#[from] std::io::Error),

    #[error("no certificates found in CA file")]
    NoCertificates,

    #[error("invalid CA certificate: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Build the TLS client configuration for device connections.
///
/// With `insecure`, server certificates are not verified at all. Otherwise
/// they must chain to a certificate in `ca_file`.
pub fn load_tls_config(
    ca_file: Option<&Path>,
    insecure: bool,
) -> Result<Arc<ClientConfig>, TlsSetupError> {
    if insecure {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
            .with_no_client_auth();
        return Ok(Arc::new(config));
    }

    let path = ca_file.ok_or(TlsSetupError::MissingCaFile)?;
    let pem = std::fs::read(path)?;
    let mut reader = BufReader::new(&pem[..]);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificates);
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots.add(cert)?;
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accepts any server certificate; signatures are still checked.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
