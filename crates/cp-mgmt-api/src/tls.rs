// SPDX-License-Identifier: Apache-2.0
//! TLS probe used to read a server's certificate fingerprint.
//!
//! The probe accepts whatever chain the server presents. Trust is decided afterwards by
//! comparing the leaf fingerprint against pinned and stored values, so chain validation would
//! only get in the way of self-signed management servers. Handshake signatures are still
//! verified so the peer must hold the key for the presented certificate.

use crate::error::{ClientError, Result};
use crate::fingerprint::Fingerprint;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{
    self, ClientConfig, DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::CryptoProvider,
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use tracing::{debug, info};

/// Verifier that accepts any server certificate.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    pub fn new(provider: Arc<CryptoProvider>) -> Arc<Self> {
        Arc::new(Self { provider })
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client config for the fingerprint probe.
pub fn probe_config() -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::config_caused("unsupported TLS protocol versions", e))?
        .dangerous()
        .with_custom_certificate_verifier(AcceptAnyServerCert::new(provider))
        .with_no_client_auth();
    Ok(config)
}

/// Connect to `server:port`, read the leaf certificate fingerprint and close the connection.
pub async fn probe_fingerprint(server: &str, port: u16) -> Result<Fingerprint> {
    let connector = TlsConnector::from(Arc::new(probe_config()?));
    let server_name = ServerName::try_from(server)
        .map(|name| name.to_owned())
        .map_err(|e| ClientError::config_caused(format!("invalid server name {server:?}"), e))?;

    let tcp = TcpStream::connect((server, port)).await.map_err(|e| {
        ClientError::transport(format!("failed to connect to {server}:{port}"), e)
    })?;
    let mut tls = connector.connect(server_name, tcp).await.map_err(|e| {
        ClientError::transport(format!("TLS handshake with {server}:{port} failed"), e)
    })?;

    let fingerprint = {
        let (_, conn) = tls.get_ref();
        conn.peer_certificates()
            .and_then(|certs| certs.first())
            .filter(|leaf| !leaf.as_ref().is_empty())
            .map(|leaf| Fingerprint::from_cert_der(leaf.as_ref()))
    };

    if let Err(e) = tls.shutdown().await {
        debug!(server, error = %e, "probe connection did not close cleanly");
    } else {
        debug!(server, "probe connection closed after reading the fingerprint");
    }

    let fingerprint = fingerprint
        .ok_or_else(|| ClientError::trust("Fingerprint returned from the server is empty."))?;
    info!(server, %fingerprint, "server fingerprint (SHA-256)");
    Ok(fingerprint)
}
