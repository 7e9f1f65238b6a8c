use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::config::TlsPolicy;
use crate::error::DualSqlError;

/// Certificate verifier for [`TlsPolicy::AcceptInvalidCerts`].
///
/// Any certificate chain is accepted; handshake signatures are still checked so the session
/// is bound to the key the server presented.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
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
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// rustls client configuration for an enabled TLS policy.
///
/// # Errors
/// Returns `DualSqlError::ConfigError` for [`TlsPolicy::Disabled`] or if the ring provider
/// rejects the default protocol versions.
pub fn client_config(policy: TlsPolicy) -> Result<ClientConfig, DualSqlError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| DualSqlError::ConfigError(format!("tls protocol setup failed: {e}")))?;

    let config = match policy {
        TlsPolicy::Disabled => {
            return Err(DualSqlError::ConfigError(
                "tls client config requested with tls disabled".to_string(),
            ));
        }
        TlsPolicy::Verified => {
            let mut roots = RootCertStore::empty();
            roots.add_parsable_certificates(webpki_root_certs::TLS_SERVER_ROOT_CERTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsPolicy::AcceptInvalidCerts => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth(),
    };
    Ok(config)
}

/// Connector handed to the pool manager.
///
/// # Errors
/// See [`client_config`].
pub fn make_connector(policy: TlsPolicy) -> Result<MakeRustlsConnect, DualSqlError> {
    Ok(MakeRustlsConnect::new(client_config(policy)?))
}
